//! HMAC-authenticated channel messaging over UDP.
//!
//! The proxy runs a [`UdpMessagingServer`]; each backend runs a
//! [`UdpMessagingClient`] pointed at it. Both sides share one secret.
//!
//! ```text
//! client ──HANDSHAKE(ts, nonce)──▶ server   authorizes the client address
//! client ◀──HANDSHAKE_ACK(nonce)── server
//! client ◀──────MESSAGE(ch, p)───▶ server   only for authorized addresses
//! ```
//!
//! A client re-handshakes every `handshake_interval`; the server forgets
//! an address after `peer_ttl_millis` without traffic. Frames that don't
//! decode or verify are dropped silently (trace/debug logs only).

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use handoff_guard::{Clock, ReplayConfig, ReplayProtector};
use handoff_wire::{MessagingFrame, NONCE_SIZE};
use rand::RngCore;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::{ChannelHandler, ChannelRegistry, Messaging, TransportError, validate_channel_id};

/// Largest UDP payload over IPv4.
const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Handshake timestamps further than this from "now" are ignored.
    pub max_clock_skew_millis: i64,
    /// How long an address stays authorized after its last valid frame.
    pub peer_ttl_millis: i64,
    /// Client re-handshake period.
    pub handshake_interval: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_clock_skew_millis: 120_000,
            peer_ttl_millis: 120_000,
            handshake_interval: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

struct ServerInner {
    socket: UdpSocket,
    secret: Arc<[u8]>,
    handlers: ChannelRegistry,
    /// Address → authorized-until (epoch millis).
    authorized: DashMap<SocketAddr, i64>,
    handshake_nonces: ReplayProtector<[u8; NONCE_SIZE]>,
    clock: Arc<dyn Clock>,
    config: UdpConfig,
}

/// The proxy side: accepts handshakes, broadcasts to authorized peers.
pub struct UdpMessagingServer {
    inner: Arc<ServerInner>,
    task: JoinHandle<()>,
}

impl UdpMessagingServer {
    pub async fn bind(
        addr: &str,
        secret: impl AsRef<[u8]>,
        clock: Arc<dyn Clock>,
        config: UdpConfig,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await.map_err(TransportError::BindFailed)?;
        let replay = ReplayConfig {
            window_millis: config.max_clock_skew_millis.saturating_mul(2),
            ..ReplayConfig::default()
        };
        let inner = Arc::new(ServerInner {
            socket,
            secret: Arc::from(secret.as_ref()),
            handlers: ChannelRegistry::new(),
            authorized: DashMap::new(),
            handshake_nonces: ReplayProtector::new(replay, Arc::clone(&clock)),
            clock,
            config,
        });
        info!(addr = %inner.socket.local_addr().map_err(TransportError::BindFailed)?, "messaging server listening");

        let looped = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match looped.socket.recv_from(&mut buf).await {
                    Ok((len, from)) => looped.handle_datagram(from, &buf[..len]),
                    Err(e) => {
                        warn!(error = %e, "messaging receive failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
        Ok(Self { inner, task })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }

    /// Addresses currently allowed to exchange messages.
    pub fn authorized_peers(&self) -> usize {
        let now = self.inner.clock.now_millis();
        self.inner.authorized.iter().filter(|e| *e.value() >= now).count()
    }
}

impl Drop for UdpMessagingServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ServerInner {
    fn handle_datagram(&self, from: SocketAddr, data: &[u8]) {
        let Some(signed) = MessagingFrame::decode(data) else {
            trace!(%from, "undecodable messaging frame");
            return;
        };
        if !signed.verify(&self.secret) {
            debug!(%from, "messaging frame failed verification");
            return;
        }
        let now = self.clock.now_millis();
        match signed.frame {
            MessagingFrame::Handshake {
                timestamp_millis,
                nonce,
            } => {
                if timestamp_millis.abs_diff(now) > self.config.max_clock_skew_millis.unsigned_abs() {
                    debug!(%from, timestamp_millis, "handshake outside clock skew");
                    return;
                }
                if !self.handshake_nonces.try_register(nonce) {
                    debug!(%from, "replayed handshake");
                    return;
                }
                self.authorized.insert(from, now + self.config.peer_ttl_millis);
                match (MessagingFrame::HandshakeAck { nonce }).encode(&self.secret) {
                    Ok(ack) => {
                        if let Err(e) = self.socket.try_send_to(&ack, from) {
                            debug!(%from, error = %e, "handshake ack not sent");
                        }
                    }
                    Err(e) => warn!(error = %e, "handshake ack encode failed"),
                }
            }
            MessagingFrame::Message { channel, payload } => {
                let fresh = match self.authorized.get_mut(&from) {
                    Some(mut until) if *until >= now => {
                        *until = now + self.config.peer_ttl_millis;
                        true
                    }
                    _ => false,
                };
                if !fresh {
                    self.authorized.remove_if(&from, |_, until| *until < now);
                    debug!(%from, "message from unauthorized address");
                    return;
                }
                self.handlers.dispatch(&channel, &payload);
            }
            MessagingFrame::HandshakeAck { .. } => {}
        }
    }
}

impl Messaging for UdpMessagingServer {
    /// Broadcasts to every authorized peer.
    fn send(&self, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        validate_channel_id(channel)?;
        let frame = MessagingFrame::Message {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        }
        .encode(&self.inner.secret)?;

        let now = self.inner.clock.now_millis();
        let targets: Vec<SocketAddr> = self
            .inner
            .authorized
            .iter()
            .filter(|e| *e.value() >= now)
            .map(|e| *e.key())
            .collect();
        if targets.is_empty() {
            return Err(TransportError::NoPeer);
        }
        for target in targets {
            if let Err(e) = self.inner.socket.try_send_to(&frame, target) {
                debug!(%target, error = %e, "broadcast to peer failed");
            }
        }
        Ok(())
    }

    fn register_channel(&self, channel: &str, handler: ChannelHandler) -> Result<(), TransportError> {
        self.inner.handlers.register(channel, handler)
    }

    fn unregister_channel(&self, channel: &str) {
        self.inner.handlers.unregister(channel);
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

struct ClientInner {
    socket: UdpSocket,
    secret: Arc<[u8]>,
    handlers: ChannelRegistry,
    acknowledged: AtomicBool,
    clock: Arc<dyn Clock>,
}

/// The backend side: handshakes with one server and talks only to it.
pub struct UdpMessagingClient {
    inner: Arc<ClientInner>,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpMessagingClient {
    pub async fn connect(
        server: SocketAddr,
        secret: impl AsRef<[u8]>,
        clock: Arc<dyn Clock>,
        config: UdpConfig,
    ) -> Result<Self, TransportError> {
        let local = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await.map_err(TransportError::BindFailed)?;
        socket.connect(server).await.map_err(TransportError::BindFailed)?;

        let inner = Arc::new(ClientInner {
            socket,
            secret: Arc::from(secret.as_ref()),
            handlers: ChannelRegistry::new(),
            acknowledged: AtomicBool::new(false),
            clock,
        });

        let receiver = Arc::clone(&inner);
        let recv_task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match receiver.socket.recv(&mut buf).await {
                    Ok(len) => receiver.handle_datagram(&buf[..len]),
                    Err(e) => {
                        debug!(error = %e, "messaging receive failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });

        let handshaker = Arc::clone(&inner);
        let interval = config.handshake_interval;
        let handshake_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                handshaker.send_handshake();
            }
        });

        info!(%server, "messaging client started");
        Ok(Self {
            inner,
            tasks: vec![recv_task, handshake_task],
        })
    }

    /// `true` once the server has acknowledged a handshake.
    pub fn is_acknowledged(&self) -> bool {
        self.inner.acknowledged.load(Ordering::Acquire)
    }
}

impl Drop for UdpMessagingClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl ClientInner {
    fn send_handshake(&self) {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);
        let frame = MessagingFrame::Handshake {
            timestamp_millis: self.clock.now_millis(),
            nonce,
        };
        match frame.encode(&self.secret) {
            Ok(bytes) => {
                if let Err(e) = self.socket.try_send(&bytes) {
                    debug!(error = %e, "handshake not sent");
                }
            }
            Err(e) => warn!(error = %e, "handshake encode failed"),
        }
    }

    fn handle_datagram(&self, data: &[u8]) {
        let Some(signed) = MessagingFrame::decode(data) else {
            trace!("undecodable messaging frame");
            return;
        };
        if !signed.verify(&self.secret) {
            debug!("messaging frame failed verification");
            return;
        }
        match signed.frame {
            MessagingFrame::HandshakeAck { .. } => {
                self.acknowledged.store(true, Ordering::Release);
            }
            MessagingFrame::Message { channel, payload } => {
                self.handlers.dispatch(&channel, &payload);
            }
            MessagingFrame::Handshake { .. } => {}
        }
    }
}

impl Messaging for UdpMessagingClient {
    fn send(&self, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        validate_channel_id(channel)?;
        let frame = MessagingFrame::Message {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        }
        .encode(&self.inner.secret)?;
        self.inner
            .socket
            .try_send(&frame)
            .map(|_| ())
            .map_err(TransportError::SendFailed)
    }

    fn register_channel(&self, channel: &str, handler: ChannelHandler) -> Result<(), TransportError> {
        self.inner.handlers.register(channel, handler)
    }

    fn unregister_channel(&self, channel: &str) {
        self.inner.handlers.unregister(channel);
    }
}
