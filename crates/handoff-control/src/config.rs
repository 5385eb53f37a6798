use handoff_wire::MAX_SENDER_ID_LEN;
use serde::Deserialize;

/// Control-plane tuning, shared by the proxy and backend sides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Written into every outbound envelope.
    pub sender_id: String,
    /// Largest accepted packet, and largest inner payload, in bytes.
    pub max_payload_bytes: usize,
    /// Packets handled at once before ingress refuses more.
    pub max_in_flight: usize,
    pub replay_window_millis: i64,
    pub replay_max_entries: usize,
    /// Tolerated clock difference between sender and receiver.
    pub max_clock_skew_millis: i64,
    /// Lifetime stamped on outbound envelopes.
    pub ttl_millis: i64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            sender_id: "proxy".to_string(),
            max_payload_bytes: 8192,
            max_in_flight: 256,
            replay_window_millis: 10_000,
            replay_max_entries: 100_000,
            max_clock_skew_millis: 60_000,
            ttl_millis: 10_000,
        }
    }
}

impl ControlPlaneConfig {
    /// Same defaults with a different sender id.
    pub fn for_sender(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            ..Self::default()
        }
    }

    /// Problems that make the config unusable, if any.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.sender_id.trim().is_empty() {
            problems.push("control.sender_id must not be blank".to_string());
        }
        if self.sender_id.len() > MAX_SENDER_ID_LEN {
            problems.push(format!("control.sender_id is longer than {MAX_SENDER_ID_LEN} bytes"));
        }
        if self.max_payload_bytes == 0 {
            problems.push("control.max_payload_bytes must be positive".to_string());
        }
        if self.max_in_flight == 0 {
            problems.push("control.max_in_flight must be positive".to_string());
        }
        for (name, value) in [
            ("control.replay_window_millis", self.replay_window_millis),
            ("control.ttl_millis", self.ttl_millis),
        ] {
            if value <= 0 {
                problems.push(format!("{name} must be positive"));
            }
        }
        if self.max_clock_skew_millis < 0 {
            problems.push("control.max_clock_skew_millis must not be negative".to_string());
        }
        problems
    }
}
