//! Log output setup for hosts that don't bring their own subscriber.

use tracing_subscriber::EnvFilter;

use crate::HandoffError;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by
/// `default_directive` (e.g. `"info"` or `"handoff_control=debug"`) when
/// `RUST_LOG` is unset or unparsable.
///
/// Fails instead of panicking when a global subscriber already exists.
pub fn init_tracing(default_directive: &str) -> Result<(), HandoffError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| HandoffError::Telemetry(e.to_string()))
}
