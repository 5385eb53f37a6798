//! Time-windowed, size-bounded replay protection.
//!
//! ```text
//! try_register(k) at t:
//!   k unseen or expired  → store (t + window, t), accept
//!   k seen, not expired  → refresh last_seen = t, reject
//! ```
//!
//! Expired entries are swept at most once per window, by whichever
//! caller wins a compare-and-swap on the last-cleanup timestamp. When
//! the map grows past `max_entries`, the least-recently-seen keys go
//! first.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::Clock;

/// Tuning for a [`ReplayProtector`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// How long a registered key blocks re-registration.
    pub window_millis: i64,
    /// Upper bound on tracked keys.
    pub max_entries: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            window_millis: 10_000,
            max_entries: 100_000,
        }
    }
}

impl ReplayConfig {
    /// Returns a copy with out-of-range values clamped to the minimum.
    pub fn validated(mut self) -> Self {
        if self.window_millis < 1 {
            warn!(window_millis = self.window_millis, "replay window clamped to 1ms");
            self.window_millis = 1;
        }
        if self.max_entries < 1 {
            warn!("replay max_entries clamped to 1");
            self.max_entries = 1;
        }
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Seen {
    expires_at: i64,
    last_seen: i64,
}

/// A "seen before" set keyed by `K`.
///
/// The key shape is up to the caller; the algorithm doesn't care what
/// the parts of the key mean.
pub struct ReplayProtector<K> {
    entries: DashMap<K, Seen>,
    config: ReplayConfig,
    last_cleanup: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash + Clone> ReplayProtector<K> {
    pub fn new(config: ReplayConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            entries: DashMap::new(),
            config: config.validated(),
            last_cleanup: AtomicI64::new(now),
            clock,
        }
    }

    /// Registers `key`. Returns `true` the first time a key is seen within
    /// the window, `false` for every repeat.
    pub fn try_register(&self, key: K) -> bool {
        let now = self.clock.now_millis();
        self.cleanup_if_due(now);

        let fresh = Seen {
            expires_at: now.saturating_add(self.config.window_millis),
            last_seen: now,
        };
        let accepted = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let seen = occupied.get_mut();
                if seen.expires_at > now {
                    seen.last_seen = now;
                    false
                } else {
                    *seen = fresh;
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        };

        if accepted {
            self.enforce_capacity();
        }
        accepted
    }

    /// Number of tracked keys, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cleanup_if_due(&self, now: i64) {
        let last = self.last_cleanup.load(Ordering::Acquire);
        if now.saturating_sub(last) < self.config.window_millis {
            return;
        }
        if self
            .last_cleanup
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, seen| seen.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "expired replay entries swept");
        }
    }

    fn enforce_capacity(&self) {
        let overflow = self.entries.len().saturating_sub(self.config.max_entries);
        if overflow == 0 {
            return;
        }
        let mut by_age: Vec<(K, i64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_seen))
            .collect();
        by_age.sort_by_key(|(_, last_seen)| *last_seen);
        for (key, _) in by_age.into_iter().take(overflow) {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    // -- Helpers --

    fn protector(window: i64, max: usize) -> (Arc<ManualClock>, ReplayProtector<String>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let config = ReplayConfig {
            window_millis: window,
            max_entries: max,
        };
        let protector = ReplayProtector::new(config, clock.clone());
        (clock, protector)
    }

    // =========================================================================
    // try_register
    // =========================================================================

    #[test]
    fn test_try_register_window_boundary() {
        let (clock, protector) = protector(5_000, 100);
        assert!(protector.try_register("k".into()));
        assert!(!protector.try_register("k".into()));
        clock.set(6_001);
        assert!(protector.try_register("k".into()));
    }

    #[test]
    fn test_try_register_distinct_keys_accepted() {
        let (_, protector) = protector(5_000, 100);
        assert!(protector.try_register("a".into()));
        assert!(protector.try_register("b".into()));
        assert_eq!(protector.len(), 2);
    }

    #[test]
    fn test_try_register_repeat_refreshes_last_seen() {
        let (clock, protector) = protector(5_000, 2);
        assert!(protector.try_register("old".into()));
        clock.advance(10);
        assert!(protector.try_register("newer".into()));
        clock.advance(10);
        // Touching "old" makes "newer" the least recently seen.
        assert!(!protector.try_register("old".into()));
        clock.advance(10);
        assert!(protector.try_register("third".into()));

        assert_eq!(protector.len(), 2);
        assert!(!protector.try_register("old".into()));
        assert!(protector.try_register("newer".into()));
    }

    // =========================================================================
    // Capacity and cleanup
    // =========================================================================

    #[test]
    fn test_capacity_evicts_least_recently_seen() {
        let (clock, protector) = protector(60_000, 3);
        for key in ["a", "b", "c", "d"] {
            assert!(protector.try_register(key.into()));
            clock.advance(1);
        }
        assert_eq!(protector.len(), 3);
        // "a" was evicted, so it registers again.
        assert!(protector.try_register("a".into()));
    }

    #[test]
    fn test_cleanup_sweeps_expired_entries_once_per_window() {
        let (clock, protector) = protector(1_000, 100);
        assert!(protector.try_register("a".into()));
        assert!(protector.try_register("b".into()));
        clock.advance(1_500);
        assert!(protector.try_register("c".into()));
        // "a" and "b" expired and were swept before "c" was added.
        assert_eq!(protector.len(), 1);
    }

    #[test]
    fn test_validated_clamps_zero_values() {
        let config = ReplayConfig {
            window_millis: 0,
            max_entries: 0,
        }
        .validated();
        assert_eq!(config.window_millis, 1);
        assert_eq!(config.max_entries, 1);
    }
}
