//! Per-key fixed-window rate limiting.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;

use crate::Clock;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_millis: i64,
    /// Events allowed per key per window.
    pub max_events: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_millis: 10_000,
            max_events: 20,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: i64,
    count: u32,
}

/// Allows at most `max_events` per key in each window.
///
/// Windows idle for two full lengths are dropped by the same
/// once-per-window sweep the replay protector uses.
pub struct FixedWindowRateLimiter<K> {
    windows: DashMap<K, Window>,
    window_millis: i64,
    max_events: u32,
    last_cleanup: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash> FixedWindowRateLimiter<K> {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            windows: DashMap::new(),
            window_millis: config.window_millis.max(1),
            max_events: config.max_events.max(1),
            last_cleanup: AtomicI64::new(now),
            clock,
        }
    }

    /// Counts one event for `key`. Returns `false` if the budget is spent.
    pub fn try_acquire(&self, key: K) -> bool {
        let now = self.clock.now_millis();
        self.cleanup_if_due(now);

        match self.windows.entry(key) {
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                if now - window.started_at >= self.window_millis {
                    *window = Window {
                        started_at: now,
                        count: 1,
                    };
                    true
                } else if window.count < self.max_events {
                    window.count += 1;
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Window {
                    started_at: now,
                    count: 1,
                });
                true
            }
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn cleanup_if_due(&self, now: i64) {
        let last = self.last_cleanup.load(Ordering::Acquire);
        if now.saturating_sub(last) < self.window_millis
            || self
                .last_cleanup
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return;
        }
        let idle_after = self.window_millis.saturating_mul(2);
        self.windows
            .retain(|_, window| now - window.started_at < idle_after);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn limiter(max: u32) -> (Arc<ManualClock>, FixedWindowRateLimiter<&'static str>) {
        let clock = Arc::new(ManualClock::new(0));
        let config = RateLimitConfig {
            window_millis: 1_000,
            max_events: max,
        };
        (clock.clone(), FixedWindowRateLimiter::new(config, clock))
    }

    #[test]
    fn test_try_acquire_over_budget_returns_false() {
        let (_, limiter) = limiter(2);
        assert!(limiter.try_acquire("ip"));
        assert!(limiter.try_acquire("ip"));
        assert!(!limiter.try_acquire("ip"));
        assert!(limiter.try_acquire("other-ip"));
    }

    #[test]
    fn test_try_acquire_next_window_resets() {
        let (clock, limiter) = limiter(1);
        assert!(limiter.try_acquire("ip"));
        assert!(!limiter.try_acquire("ip"));
        clock.advance(1_000);
        assert!(limiter.try_acquire("ip"));
    }

    #[test]
    fn test_idle_windows_are_swept() {
        let (clock, limiter) = limiter(1);
        assert!(limiter.try_acquire("a"));
        clock.advance(2_500);
        assert!(limiter.try_acquire("b"));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
