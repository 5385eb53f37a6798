//! Transport contracts for the handoff proxy.
//!
//! The core never opens sockets on its own. It is handed two things:
//!
//! - a [`Link`] per connection: "send these bytes to this client (or
//!   backend)". Sessions hold links weakly; whoever accepted the socket
//!   owns it.
//! - a [`Messaging`] endpoint: "send bytes on channel X" and "deliver
//!   bytes arriving on channel X to this handler". The control plane
//!   runs on top of it.
//!
//! Two `Messaging` implementations ship here: [`LoopbackMessaging`]
//! for in-process wiring and tests, and (feature `udp`, default) an
//! HMAC-authenticated UDP server/client pair speaking the messaging
//! frame from `handoff-wire`.
//!
//! # Feature Flags
//!
//! - `udp` (default): [`UdpMessagingServer`] and [`UdpMessagingClient`]

mod channel;
mod error;
mod link;
mod loopback;
#[cfg(feature = "udp")]
mod udp;

pub use channel::{ChannelHandler, ChannelRegistry, validate_channel_id};
pub use error::TransportError;
pub use link::{ChannelLink, Link};
pub use loopback::LoopbackMessaging;
#[cfg(feature = "udp")]
pub use udp::{UdpConfig, UdpMessagingClient, UdpMessagingServer};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a client or backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// A process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Channel-addressed datagram messaging.
pub trait Messaging: Send + Sync + 'static {
    /// Sends `payload` on `channel` to the peer(s) of this endpoint.
    fn send(&self, channel: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Routes inbound payloads on `channel` to `handler`, replacing any
    /// previous handler.
    fn register_channel(&self, channel: &str, handler: ChannelHandler) -> Result<(), TransportError>;

    fn unregister_channel(&self, channel: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}
