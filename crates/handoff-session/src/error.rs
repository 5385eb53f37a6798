//! Error types for the session layer.

use crate::{SessionId, SessionState};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The requested state change isn't in the transition table.
    /// Always a caller bug; the state is left as it was.
    #[error("illegal session transition {from} -> {to}")]
    IllegalTransition { from: SessionState, to: SessionState },

    /// No session is registered under this id.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The link the session was attached to has been dropped (or the
    /// session was never attached on that side).
    #[error("session {0} has no live link")]
    LinkClosed(SessionId),

    /// The link exists but refused the bytes.
    #[error(transparent)]
    Transport(#[from] handoff_transport::TransportError),
}
