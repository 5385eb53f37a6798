//! Error types for the guard layer.

/// Errors raised by the limiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    /// Every lease is taken. Callers fail the operation instead of waiting.
    #[error("in-flight limit of {limit} reached")]
    Saturated { limit: usize },
}
