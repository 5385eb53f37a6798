//! In-process `Messaging`, for embedding proxy and backend in one
//! process and for tests.

use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use crate::{ChannelHandler, ChannelRegistry, Messaging, TransportError, validate_channel_id};

/// A messaging endpoint that hands payloads straight to its peer's
/// handlers on the caller's thread.
///
/// Every sent payload is also recorded, so a test can inspect what an
/// endpoint emitted with [`take_sent`](Self::take_sent).
#[derive(Default)]
pub struct LoopbackMessaging {
    handlers: ChannelRegistry,
    peer: OnceLock<Weak<LoopbackMessaging>>,
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl LoopbackMessaging {
    /// An endpoint with no peer. `send` only records.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Two endpoints wired to each other.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let a = Self::new();
        let b = Self::new();
        let _ = a.peer.set(Arc::downgrade(&b));
        let _ = b.peer.set(Arc::downgrade(&a));
        (a, b)
    }

    /// Simulates a payload arriving on `channel`.
    pub fn deliver(&self, channel: &str, payload: &[u8]) -> bool {
        self.handlers.dispatch(channel, payload)
    }

    /// Drains the record of sent payloads.
    pub fn take_sent(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Messaging for LoopbackMessaging {
    fn send(&self, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        validate_channel_id(channel)?;
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel.to_string(), payload.to_vec()));
        if let Some(peer) = self.peer.get().and_then(Weak::upgrade) {
            peer.deliver(channel, payload);
        }
        Ok(())
    }

    fn register_channel(&self, channel: &str, handler: ChannelHandler) -> Result<(), TransportError> {
        self.handlers.register(channel, handler)
    }

    fn unregister_channel(&self, channel: &str) {
        self.handlers.unregister(channel);
    }
}
