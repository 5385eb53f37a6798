//! Channel ids and handler registration shared by every `Messaging`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::TransportError;

/// Receives every payload that arrives on one channel.
pub type ChannelHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

const MAX_CHANNEL_ID_LEN: usize = 64;

/// Channel ids are 1..=64 characters of `[A-Za-z0-9_.:-]`.
pub fn validate_channel_id(channel: &str) -> Result<(), TransportError> {
    let valid = !channel.is_empty()
        && channel.len() <= MAX_CHANNEL_ID_LEN
        && channel
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidChannel(channel.to_string()))
    }
}

/// Channel id → handler map.
#[derive(Default)]
pub struct ChannelRegistry {
    handlers: DashMap<String, ChannelHandler>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, channel: &str, handler: ChannelHandler) -> Result<(), TransportError> {
        validate_channel_id(channel)?;
        self.handlers.insert(channel.to_string(), handler);
        Ok(())
    }

    pub fn unregister(&self, channel: &str) {
        self.handlers.remove(channel);
    }

    /// Hands `payload` to the channel's handler. Returns `false` if no
    /// handler is registered. The map isn't locked while the handler runs.
    pub fn dispatch(&self, channel: &str, payload: &[u8]) -> bool {
        let handler = self.handlers.get(channel).map(|h| Arc::clone(h.value()));
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => {
                tracing::trace!(channel, "no handler for channel");
                false
            }
        }
    }
}
