//! Error types for the token layer.

use handoff_wire::TokenRejectReason;

/// Errors raised while building or issuing a token, or configuring secrets.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// A claim value can't be encoded (blank id, reserved delimiter,
    /// negative or inverted timestamps).
    #[error("invalid claim {field}: {reason}")]
    InvalidClaim {
        field: &'static str,
        reason: &'static str,
    },

    /// A configured secret fails the strength policy.
    #[error("{field} {reason}")]
    WeakSecret { field: String, reason: &'static str },
}

/// A token that was presented and refused.
///
/// `reason` is the stable classification operators alert on; `detail`
/// is for logs only and never goes back to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {detail}")]
pub struct TokenValidationError {
    pub reason: TokenRejectReason,
    pub detail: String,
}

impl TokenValidationError {
    pub fn new(reason: TokenRejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::new(TokenRejectReason::Malformed, detail)
    }
}
