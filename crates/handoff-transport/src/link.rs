//! Per-connection send capability.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::{ConnectionId, TransportError};

/// Sends bytes to one client or backend connection.
///
/// `send` never blocks: a full buffer is [`TransportError::Backpressure`],
/// a dropped receiver is [`TransportError::LinkClosed`].
pub trait Link: Send + Sync + 'static {
    fn id(&self) -> ConnectionId;

    fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError>;
}

/// A [`Link`] backed by a bounded tokio channel. The accept loop owns
/// the receiver and writes what comes out of it to the socket.
#[derive(Debug)]
pub struct ChannelLink {
    id: ConnectionId,
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelLink {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let link = Arc::new(Self {
            id: ConnectionId::next(),
            tx,
        });
        (link, rx)
    }
}

impl Link for ChannelLink {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Backpressure(self.id),
            TrySendError::Closed(_) => TransportError::LinkClosed(self.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_delivers_to_receiver() {
        let (link, mut rx) = ChannelLink::new(4);
        link.send(vec![1, 2]).unwrap();
        assert_eq!(rx.recv().await, Some(vec![1, 2]));
    }

    #[test]
    fn test_send_full_buffer_is_backpressure() {
        let (link, _rx) = ChannelLink::new(1);
        link.send(vec![1]).unwrap();
        assert!(matches!(link.send(vec![2]), Err(TransportError::Backpressure(_))));
    }

    #[test]
    fn test_send_after_receiver_dropped_is_closed() {
        let (link, rx) = ChannelLink::new(1);
        drop(rx);
        assert!(matches!(link.send(vec![1]), Err(TransportError::LinkClosed(id)) if id == link.id()));
    }
}
