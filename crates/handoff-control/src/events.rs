//! Control-plane notifications.

use handoff_event::Event;
use handoff_wire::{BackendStatus, TokenRejectReason, TransferFailureReason, TransferStatus, ValidationOutcome};
use uuid::Uuid;

/// A backend reported the outcome of validating a player's proxy token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidated {
    pub player_id: Uuid,
    pub backend_id: String,
    pub outcome: ValidationOutcome,
    pub reason: Option<TokenRejectReason>,
}

impl Event for TokenValidated {}

/// A backend's self-reported status changed (or was reported for the
/// first time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatusChanged {
    pub backend_id: String,
    pub previous: Option<BackendStatus>,
    pub status: BackendStatus,
}

impl Event for BackendStatusChanged {}

/// A backend answered a transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCompleted {
    pub correlation_id: Uuid,
    /// `None` when the request isn't one this proxy is tracking.
    pub player_id: Option<Uuid>,
    pub status: TransferStatus,
    pub reason: Option<TransferFailureReason>,
    pub latency_millis: Option<i64>,
}

impl Event for TransferCompleted {}
