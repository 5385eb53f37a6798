//! Error types for the control plane.

/// Failures on the outbound path. Inbound problems are never errors:
/// they are tallied as a [`RejectReason`](crate::RejectReason) and dropped.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The encoded payload is over `max_payload_bytes`.
    #[error("outbound payload of {size} bytes exceeds {max}")]
    OutboundPayloadTooLarge { size: usize, max: usize },

    /// The payload or envelope couldn't be framed.
    #[error(transparent)]
    Encode(#[from] handoff_wire::WireError),

    /// The messaging endpoint refused the packet.
    #[error(transparent)]
    Transport(#[from] handoff_transport::TransportError),
}
