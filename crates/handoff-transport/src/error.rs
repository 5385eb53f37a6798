//! Error types for the transport layer.

use crate::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link's receiving side is gone.
    #[error("link {0} closed")]
    LinkClosed(ConnectionId),

    /// The link's outbound buffer is full.
    #[error("link {0} is not keeping up")]
    Backpressure(ConnectionId),

    /// The channel id is empty, too long, or has illegal characters.
    #[error("invalid channel id {0:?}")]
    InvalidChannel(String),

    /// There is nobody to send to (no peer wired, or none authorized).
    #[error("no reachable peer")]
    NoPeer,

    /// The frame couldn't be encoded.
    #[error(transparent)]
    Encode(#[from] handoff_wire::WireError),

    /// Binding the socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Writing a datagram failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),
}
