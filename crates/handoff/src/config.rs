//! Facade configuration.
//!
//! Both configs deserialize from any serde format with every field
//! optional; missing fields take the documented defaults. Call
//! `validate()` (the builders do) before using one.

use std::collections::HashSet;

use handoff_control::ControlPlaneConfig;
use handoff_guard::RateLimitConfig;
use handoff_route::{BackendInfo, RoutingConfig};
use handoff_token::check_secret_strength;
use handoff_wire::{HostAddress, MAX_SENDER_ID_LEN, ProtocolLimits};
use serde::Deserialize;

use crate::HandoffError;

// ---------------------------------------------------------------------------
// ProxyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// The proxy's control-plane sender id. Backends expect it.
    pub proxy_id: String,
    /// The address clients reach the proxy on, stamped into forwarded
    /// connect frames as the referral source.
    pub referral: ReferralConfig,
    pub security: SecurityConfig,
    pub backends: Vec<BackendInfo>,
    pub routing: RoutingConfig,
    /// `sender_id` is ignored; `proxy_id` is used.
    pub control: ControlPlaneConfig,
    pub limits: ProtocolLimits,
    /// Connect attempts allowed per client IP.
    pub connect_rate: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Signs proxy and transfer tokens.
    pub proxy_secret: String,
    /// Still accepted while backends roll over to `proxy_secret`.
    pub previous_proxy_secret: Option<String>,
    pub proxy_token_ttl_millis: i64,
    pub transfer_token_ttl_millis: i64,
    /// Bound into proxy tokens when set.
    pub proxy_cert_fingerprint: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxy_id: "proxy".to_string(),
            referral: ReferralConfig::default(),
            security: SecurityConfig::default(),
            backends: Vec::new(),
            routing: RoutingConfig::default(),
            control: ControlPlaneConfig::default(),
            limits: ProtocolLimits::default(),
            connect_rate: RateLimitConfig::default(),
        }
    }
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25565,
        }
    }
}

impl ReferralConfig {
    pub fn address(&self) -> HostAddress {
        HostAddress::new(self.host.clone(), self.port)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            proxy_secret: String::new(),
            previous_proxy_secret: None,
            proxy_token_ttl_millis: 10_000,
            transfer_token_ttl_millis: handoff_token::DEFAULT_TRANSFER_TTL_MILLIS,
            proxy_cert_fingerprint: None,
        }
    }
}

// Secrets stay out of debug output.
impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("proxy_secret", &"<redacted>")
            .field("previous_proxy_secret", &self.previous_proxy_secret.as_ref().map(|_| "<redacted>"))
            .field("proxy_token_ttl_millis", &self.proxy_token_ttl_millis)
            .field("transfer_token_ttl_millis", &self.transfer_token_ttl_millis)
            .field("proxy_cert_fingerprint", &self.proxy_cert_fingerprint)
            .finish()
    }
}

impl ProxyConfig {
    pub fn from_json_str(json: &str) -> Result<Self, HandoffError> {
        serde_json::from_str(json).map_err(|e| HandoffError::Config(vec![e.to_string()]))
    }

    /// The control config actually used, with `proxy_id` as sender.
    pub fn effective_control(&self) -> ControlPlaneConfig {
        ControlPlaneConfig {
            sender_id: self.proxy_id.clone(),
            ..self.control.clone()
        }
    }

    /// Checks every rule and reports all failures at once.
    pub fn validate(&self) -> Result<(), HandoffError> {
        let mut problems = Vec::new();

        check_id(&mut problems, "proxy_id", &self.proxy_id);
        if self.referral.host.trim().is_empty() {
            problems.push("referral.host must not be blank".to_string());
        }
        check_secrets(
            &mut problems,
            &self.security.proxy_secret,
            self.security.previous_proxy_secret.as_deref(),
        );
        for (name, value) in [
            ("security.proxy_token_ttl_millis", self.security.proxy_token_ttl_millis),
            ("security.transfer_token_ttl_millis", self.security.transfer_token_ttl_millis),
        ] {
            if value <= 0 {
                problems.push(format!("{name} must be positive"));
            }
        }

        if self.backends.is_empty() {
            problems.push("at least one backend must be configured".to_string());
        }
        let mut seen = HashSet::new();
        for backend in &self.backends {
            check_id(&mut problems, "backends[].id", &backend.id);
            if backend.host.trim().is_empty() {
                problems.push(format!("backend {} has a blank host", backend.id));
            }
            if !seen.insert(backend.id.as_str()) {
                problems.push(format!("backend id {} is configured twice", backend.id));
            }
        }
        if !seen.contains(self.routing.default_backend_id.as_str()) {
            problems.push(format!(
                "routing.default_backend_id {} is not a configured backend",
                self.routing.default_backend_id
            ));
        }
        if self.routing.max_in_flight == 0 {
            problems.push("routing.max_in_flight must be positive".to_string());
        }

        problems.extend(self.effective_control().problems());
        finish(problems)
    }
}

// ---------------------------------------------------------------------------
// BackendNodeConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BackendNodeConfig {
    /// This backend's id: the token target it accepts and its control
    /// sender id. Must match the proxy's backend list.
    pub server_id: String,
    pub proxy_secret: String,
    pub previous_proxy_secret: Option<String>,
    /// Reject clients whose proxy token fails. When off, failures are
    /// logged and the client is let in.
    pub enforce_proxy: bool,
    /// Require certificate fingerprints in proxy tokens.
    pub require_certificates: bool,
    /// Where redirected players reconnect.
    pub proxy_connect_host: String,
    pub proxy_connect_port: u16,
    /// `sender_id` is ignored; `server_id` is used.
    pub control: ControlPlaneConfig,
    /// The proxy's sender id.
    pub expected_sender_id: String,
    /// Proxy-token replay window.
    pub replay_window_millis: i64,
    pub replay_max_entries: usize,
}

impl Default for BackendNodeConfig {
    fn default() -> Self {
        Self {
            server_id: String::new(),
            proxy_secret: String::new(),
            previous_proxy_secret: None,
            enforce_proxy: true,
            require_certificates: true,
            proxy_connect_host: "127.0.0.1".to_string(),
            proxy_connect_port: 25565,
            control: ControlPlaneConfig::default(),
            expected_sender_id: "proxy".to_string(),
            replay_window_millis: 10_000,
            replay_max_entries: 100_000,
        }
    }
}

impl std::fmt::Debug for BackendNodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendNodeConfig")
            .field("server_id", &self.server_id)
            .field("proxy_secret", &"<redacted>")
            .field("enforce_proxy", &self.enforce_proxy)
            .field("require_certificates", &self.require_certificates)
            .field("proxy_connect_host", &self.proxy_connect_host)
            .field("proxy_connect_port", &self.proxy_connect_port)
            .field("control", &self.control)
            .field("expected_sender_id", &self.expected_sender_id)
            .field("replay_window_millis", &self.replay_window_millis)
            .field("replay_max_entries", &self.replay_max_entries)
            .finish_non_exhaustive()
    }
}

impl BackendNodeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, HandoffError> {
        serde_json::from_str(json).map_err(|e| HandoffError::Config(vec![e.to_string()]))
    }

    /// The control config actually used, with `server_id` as sender.
    pub fn effective_control(&self) -> ControlPlaneConfig {
        ControlPlaneConfig {
            sender_id: self.server_id.clone(),
            ..self.control.clone()
        }
    }

    pub fn proxy_connect_address(&self) -> HostAddress {
        HostAddress::new(self.proxy_connect_host.clone(), self.proxy_connect_port)
    }

    pub fn validate(&self) -> Result<(), HandoffError> {
        let mut problems = Vec::new();
        check_id(&mut problems, "server_id", &self.server_id);
        check_id(&mut problems, "expected_sender_id", &self.expected_sender_id);
        check_secrets(&mut problems, &self.proxy_secret, self.previous_proxy_secret.as_deref());
        if self.proxy_connect_host.trim().is_empty() {
            problems.push("proxy_connect_host must not be blank".to_string());
        }
        if self.replay_window_millis <= 0 {
            problems.push("replay_window_millis must be positive".to_string());
        }
        if self.replay_max_entries == 0 {
            problems.push("replay_max_entries must be positive".to_string());
        }
        problems.extend(self.effective_control().problems());
        finish(problems)
    }
}

// -- Shared rules --

fn check_id(problems: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        problems.push(format!("{field} must not be blank"));
    } else if value.len() > MAX_SENDER_ID_LEN {
        problems.push(format!("{field} is longer than {MAX_SENDER_ID_LEN} bytes"));
    } else if value.contains('|') {
        problems.push(format!("{field} must not contain '|'"));
    }
}

fn check_secrets(problems: &mut Vec<String>, current: &str, previous: Option<&str>) {
    if let Err(e) = check_secret_strength(current, "proxy_secret") {
        problems.push(e.to_string());
    }
    if let Some(previous) = previous {
        if let Err(e) = check_secret_strength(previous, "previous_proxy_secret") {
            problems.push(e.to_string());
        }
    }
}

fn finish(problems: Vec<String>) -> Result<(), HandoffError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(HandoffError::Config(problems))
    }
}
