//! What the proxy believes about each backend's reachability.

use std::sync::Arc;

use dashmap::DashMap;
use handoff_guard::Clock;
use handoff_route::BackendHealth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    Online,
    Offline,
    /// Never heard from.
    Unknown,
}

#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    /// Reported OFFLINE by the backend itself.
    reported_offline: bool,
    /// Connection failures push this into the future.
    unavailable_until: Option<i64>,
    /// Each ONLINE report or successful connection extends this.
    online_until: Option<i64>,
}

/// Combines backend status reports with the proxy's own connection
/// outcomes.
///
/// A backend is `Online` while its heartbeat is fresh, `Offline` once
/// it says so, misses heartbeats, or recently failed a connection, and
/// `Unknown` until anything is known.
pub struct BackendAvailability {
    entries: DashMap<String, Entry>,
    unavailable_cooldown_millis: i64,
    heartbeat_timeout_millis: i64,
    clock: Arc<dyn Clock>,
}

impl BackendAvailability {
    pub const DEFAULT_UNAVAILABLE_COOLDOWN_MILLIS: i64 = 30_000;
    pub const DEFAULT_HEARTBEAT_TIMEOUT_MILLIS: i64 = 15_000;

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_timeouts(
            clock,
            Self::DEFAULT_UNAVAILABLE_COOLDOWN_MILLIS,
            Self::DEFAULT_HEARTBEAT_TIMEOUT_MILLIS,
        )
    }

    pub fn with_timeouts(clock: Arc<dyn Clock>, unavailable_cooldown_millis: i64, heartbeat_timeout_millis: i64) -> Self {
        Self {
            entries: DashMap::new(),
            unavailable_cooldown_millis,
            heartbeat_timeout_millis,
            clock,
        }
    }

    /// The proxy failed to reach the backend.
    pub fn mark_unavailable(&self, backend_id: &str) {
        let until = self.clock.now_millis() + self.unavailable_cooldown_millis;
        self.entries.entry(backend_id.to_string()).or_default().unavailable_until = Some(until);
    }

    /// The proxy reached the backend.
    pub fn mark_available(&self, backend_id: &str) {
        self.mark_online(backend_id);
    }

    pub fn mark_reported_online(&self, backend_id: &str) {
        self.mark_online(backend_id);
    }

    pub fn mark_reported_offline(&self, backend_id: &str) {
        let mut entry = self.entries.entry(backend_id.to_string()).or_default();
        entry.reported_offline = true;
        entry.online_until = None;
    }

    pub fn status(&self, backend_id: &str) -> Availability {
        let Some(entry) = self.entries.get(backend_id).map(|e| *e.value()) else {
            return Availability::Unknown;
        };
        let now = self.clock.now_millis();
        if entry.reported_offline || entry.unavailable_until.is_some_and(|until| until > now) {
            return Availability::Offline;
        }
        match entry.online_until {
            Some(until) if until > now => Availability::Online,
            // Seen before, but the heartbeat lapsed or only a cooldown expired.
            _ => Availability::Offline,
        }
    }

    pub fn is_temporarily_unavailable(&self, backend_id: &str) -> bool {
        self.status(backend_id) == Availability::Offline
    }

    fn mark_online(&self, backend_id: &str) {
        let until = self.clock.now_millis() + self.heartbeat_timeout_millis;
        let mut entry = self.entries.entry(backend_id.to_string()).or_default();
        entry.reported_offline = false;
        entry.unavailable_until = None;
        entry.online_until = Some(until);
    }
}

impl BackendHealth for BackendAvailability {
    fn is_temporarily_unavailable(&self, backend_id: &str) -> bool {
        BackendAvailability::is_temporarily_unavailable(self, backend_id)
    }
}
