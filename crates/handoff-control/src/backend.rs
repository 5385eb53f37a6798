//! The backend's end of the control plane.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use handoff_guard::Clock;
use handoff_transport::Messaging;
use handoff_wire::{
    BackendStatus, BackendStatusNotice, ControlMessageType, HostAddress, TokenRejectReason,
    TokenValidationNotice, TransferFailureReason, TransferRequest, TransferResult, ValidationOutcome,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::endpoint::{Admitted, ControlEndpoint, SenderPolicy};
use crate::{CONTROL_CHANNEL, ControlError, ControlPlaneConfig, RejectReason};

/// How often a backend re-announces ONLINE.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// How many OFFLINE notices [`BackendControlPlane::shutdown`] sends.
const OFFLINE_BURST: usize = 3;
const OFFLINE_BURST_SPACING: Duration = Duration::from_millis(30);

pub type RedirectError = Box<dyn std::error::Error + Send + Sync>;

/// The game server's hook for moving a connected player to another
/// address.
pub trait ConnectionRedirect: Send + Sync + 'static {
    fn is_connected(&self, player_id: Uuid) -> bool;

    /// Sends the player to `proxy` carrying `referral_data`.
    fn redirect(&self, player_id: Uuid, proxy: &HostAddress, referral_data: &[u8]) -> Result<(), RedirectError>;
}

/// Executes transfer requests from the proxy and reports token
/// validation and availability back to it.
pub struct BackendControlPlane {
    endpoint: ControlEndpoint,
    server_id: String,
    proxy_address: HostAddress,
    redirect: Arc<dyn ConnectionRedirect>,
    last_announced: Mutex<Option<BackendStatus>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl BackendControlPlane {
    /// Builds the service and registers it on the control channel. Only
    /// envelopes sent by `expected_sender_id` are accepted.
    pub fn start(
        config: ControlPlaneConfig,
        messaging: Arc<dyn Messaging>,
        expected_sender_id: impl Into<String>,
        server_id: impl Into<String>,
        proxy_address: HostAddress,
        redirect: Arc<dyn ConnectionRedirect>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, ControlError> {
        let endpoint = ControlEndpoint::new(
            config,
            Arc::clone(&messaging),
            SenderPolicy::Exactly(expected_sender_id.into()),
            clock,
            "backend",
        );
        let service = Arc::new(Self {
            endpoint,
            server_id: server_id.into(),
            proxy_address,
            redirect,
            last_announced: Mutex::new(None),
            heartbeat: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&service);
        messaging.register_channel(
            CONTROL_CHANNEL,
            Arc::new(move |packet: &[u8]| {
                if let Some(service) = weak.upgrade() {
                    service.handle_packet(packet);
                }
            }),
        )?;
        tracing::info!(server_id = %service.server_id, "backend control plane started");
        Ok(service)
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Entry point for one inbound control packet.
    pub fn handle_packet(&self, packet: &[u8]) {
        let Some(admitted) = self.endpoint.admit(packet) else {
            return;
        };
        match admitted.envelope.message_type {
            ControlMessageType::TransferRequest => self.on_transfer_request(&admitted),
            other => self.endpoint.reject(
                RejectReason::UnsupportedType,
                &format!("{other} is not accepted by a backend"),
                Some(&admitted.correlation_id),
            ),
        }
    }

    /// Tells the proxy whether this backend accepted a player's proxy
    /// token.
    pub fn send_token_validation_notice(
        &self,
        player_id: Uuid,
        outcome: ValidationOutcome,
        reason: Option<TokenRejectReason>,
    ) -> Result<(), ControlError> {
        let notice = TokenValidationNotice {
            player_id,
            backend_id: self.server_id.clone(),
            outcome,
            reason,
        };
        self.endpoint.send(ControlMessageType::TokenValidation, notice.encode()?)
    }

    pub fn announce_online(&self) -> Result<(), ControlError> {
        self.announce(BackendStatus::Online)
    }

    pub fn announce_offline(&self) -> Result<(), ControlError> {
        self.announce(BackendStatus::Offline)
    }

    /// Announces ONLINE every `every`, starting now. Replaces a running
    /// heartbeat. Must be called inside a tokio runtime.
    pub fn spawn_heartbeat(self: &Arc<Self>, every: Duration) {
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let Some(service) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = service.announce_online() {
                    tracing::warn!(server_id = %service.server_id, error = %e, "heartbeat send failed");
                }
            }
        });
        let previous = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stops the heartbeat, announces OFFLINE a few times so one lost
    /// datagram doesn't leave the proxy guessing, and leaves the channel.
    pub async fn shutdown(&self) {
        let heartbeat = self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = heartbeat {
            task.abort();
        }
        for i in 0..OFFLINE_BURST {
            if let Err(e) = self.announce_offline() {
                tracing::warn!(server_id = %self.server_id, error = %e, "offline notice failed");
            }
            if i + 1 < OFFLINE_BURST {
                tokio::time::sleep(OFFLINE_BURST_SPACING).await;
            }
        }
        self.endpoint.messaging().unregister_channel(CONTROL_CHANNEL);
        tracing::info!(server_id = %self.server_id, "backend control plane stopped");
    }

    pub fn reject_snapshot(&self) -> BTreeMap<RejectReason, u64> {
        self.endpoint.reject_snapshot()
    }

    fn announce(&self, status: BackendStatus) -> Result<(), ControlError> {
        let notice = BackendStatusNotice {
            backend_id: self.server_id.clone(),
            status,
        };
        self.endpoint.send(ControlMessageType::BackendStatus, notice.encode()?)?;

        let previous = self
            .last_announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(status);
        if previous != Some(status) {
            tracing::info!(server_id = %self.server_id, %status, "announced backend status");
        }
        Ok(())
    }

    fn on_transfer_request(&self, admitted: &Admitted) {
        let Some(request) = TransferRequest::decode(&admitted.envelope.payload) else {
            self.endpoint.reject(
                RejectReason::MalformedPayload,
                "TRANSFER_REQUEST payload did not decode",
                Some(&admitted.correlation_id),
            );
            return;
        };

        let result = self.execute_transfer(&request);
        if let Err(e) = self.endpoint.send(ControlMessageType::TransferResult, result.encode()) {
            tracing::warn!(
                correlation_id = %request.correlation_id,
                error = %e,
                "could not send transfer result"
            );
        }
    }

    fn execute_transfer(&self, request: &TransferRequest) -> TransferResult {
        let player_id = request.player_id;
        if !self.redirect.is_connected(player_id) {
            tracing::debug!(%player_id, correlation_id = %request.correlation_id, "transfer for a player not on this server");
            return TransferResult::failed(request.correlation_id, TransferFailureReason::PlayerNotFound);
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.redirect
                .redirect(player_id, &self.proxy_address, &request.referral_data)
        }));
        match outcome {
            Ok(Ok(())) => {
                tracing::info!(
                    %player_id,
                    target = %request.target_backend_id,
                    "player redirected for transfer"
                );
                TransferResult::ok(request.correlation_id)
            }
            Ok(Err(e)) => {
                tracing::warn!(%player_id, error = %e, "redirect failed");
                TransferResult::failed(request.correlation_id, TransferFailureReason::InternalError)
            }
            Err(_) => {
                tracing::error!(%player_id, "redirect panicked");
                TransferResult::failed(request.correlation_id, TransferFailureReason::InternalError)
            }
        }
    }
}
