//! The proxy's end of the control plane.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use handoff_event::EventBus;
use handoff_guard::Clock;
use handoff_session::{PlayerAuthenticated, PlayerSession, SessionError, SessionRegistry, SessionState};
use handoff_transport::Messaging;
use handoff_wire::{
    BackendStatus, BackendStatusNotice, ControlMessageType, TokenValidationNotice, TransferRequest,
    TransferResult, TransferStatus, ValidationOutcome,
};
use uuid::Uuid;

use crate::endpoint::{Admitted, ControlEndpoint, SenderPolicy};
use crate::{
    BackendAvailability, BackendStatusChanged, CONTROL_CHANNEL, ControlError, ControlPlaneConfig,
    RejectReason, TokenValidated, TransferCompleted,
};

#[derive(Debug, Clone, Copy)]
struct PendingTransfer {
    started_at: i64,
    player_id: Uuid,
}

/// Receives results, validation notices and status reports from
/// backends, and sends them transfer requests.
pub struct ProxyControlPlane {
    endpoint: ControlEndpoint,
    bus: Arc<EventBus>,
    sessions: Arc<SessionRegistry>,
    availability: Arc<BackendAvailability>,
    pending: DashMap<Uuid, PendingTransfer>,
    reported: DashMap<String, BackendStatus>,
}

impl ProxyControlPlane {
    /// Builds the service and registers it on the control channel.
    /// `allowed_senders` lists backend sender ids; empty accepts any.
    pub fn start(
        config: ControlPlaneConfig,
        messaging: Arc<dyn Messaging>,
        allowed_senders: HashSet<String>,
        bus: Arc<EventBus>,
        sessions: Arc<SessionRegistry>,
        availability: Arc<BackendAvailability>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, ControlError> {
        let endpoint = ControlEndpoint::new(
            config,
            Arc::clone(&messaging),
            SenderPolicy::AnyOf(allowed_senders),
            clock,
            "proxy",
        );
        let service = Arc::new(Self {
            endpoint,
            bus,
            sessions,
            availability,
            pending: DashMap::new(),
            reported: DashMap::new(),
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
        tracing::info!(sender_id = %service.endpoint.config().sender_id, "proxy control plane started");
        Ok(service)
    }

    /// Stops receiving control packets.
    pub fn shutdown(&self) {
        self.endpoint.messaging().unregister_channel(CONTROL_CHANNEL);
    }

    /// Sends a TRANSFER_REQUEST and starts tracking it by correlation id.
    pub fn send_transfer_request(&self, request: &TransferRequest) -> Result<(), ControlError> {
        let payload = request.encode()?;
        self.pending.insert(
            request.correlation_id,
            PendingTransfer {
                started_at: self.endpoint.now_millis(),
                player_id: request.player_id,
            },
        );
        let sent = self.endpoint.send(ControlMessageType::TransferRequest, payload);
        if sent.is_err() {
            self.pending.remove(&request.correlation_id);
        }
        sent
    }

    /// Entry point for one inbound control packet.
    pub fn handle_packet(&self, packet: &[u8]) {
        let Some(admitted) = self.endpoint.admit(packet) else {
            return;
        };
        match admitted.envelope.message_type {
            ControlMessageType::TransferResult => self.on_transfer_result(&admitted),
            ControlMessageType::TokenValidation => self.on_token_validation(&admitted),
            ControlMessageType::BackendStatus => self.on_backend_status(&admitted),
            other => self.endpoint.reject(
                RejectReason::UnsupportedType,
                &format!("{other} is not accepted by the proxy"),
                Some(&admitted.correlation_id),
            ),
        }
    }

    pub fn reject_snapshot(&self) -> BTreeMap<RejectReason, u64> {
        self.endpoint.reject_snapshot()
    }

    pub fn pending_transfers(&self) -> usize {
        self.pending.len()
    }

    pub fn availability(&self) -> &Arc<BackendAvailability> {
        &self.availability
    }

    // -- Handlers --

    fn on_transfer_result(&self, admitted: &Admitted) {
        let Some(result) = TransferResult::decode(&admitted.envelope.payload) else {
            self.malformed_payload(admitted);
            return;
        };
        let pending = self.pending.remove(&result.correlation_id).map(|(_, p)| p);
        let latency_millis = pending.map(|p| (self.endpoint.now_millis() - p.started_at).max(0));
        tracing::debug!(
            correlation_id = %result.correlation_id,
            status = %result.status,
            reason = ?result.reason,
            latency_millis,
            "transfer result received"
        );

        if let (TransferStatus::Failed, Some(pending)) = (result.status, pending) {
            self.restore_after_failed_transfer(pending.player_id);
        }

        self.bus.post(TransferCompleted {
            correlation_id: result.correlation_id,
            player_id: pending.map(|p| p.player_id),
            status: result.status,
            reason: result.reason,
            latency_millis,
        });
    }

    fn on_token_validation(&self, admitted: &Admitted) {
        let Some(notice) = TokenValidationNotice::decode(&admitted.envelope.payload) else {
            self.malformed_payload(admitted);
            return;
        };
        self.bus.post(TokenValidated {
            player_id: notice.player_id,
            backend_id: notice.backend_id.clone(),
            outcome: notice.outcome,
            reason: notice.reason,
        });
        if notice.outcome != ValidationOutcome::Accepted {
            return;
        }

        let Some(session) = self.sessions.find_by_player(notice.player_id) else {
            tracing::debug!(player_id = %notice.player_id, "validation notice for a player with no session");
            return;
        };
        match authenticate(&session, &notice.backend_id) {
            Ok(()) => {
                tracing::info!(player_id = %notice.player_id, backend = %notice.backend_id, "player authenticated");
                self.bus.post(PlayerAuthenticated {
                    session,
                    player_id: notice.player_id,
                    backend_id: notice.backend_id,
                });
            }
            Err(e) => tracing::warn!(player_id = %notice.player_id, error = %e, "could not advance session"),
        }
    }

    fn on_backend_status(&self, admitted: &Admitted) {
        let Some(notice) = BackendStatusNotice::decode(&admitted.envelope.payload) else {
            self.malformed_payload(admitted);
            return;
        };
        match notice.status {
            BackendStatus::Online => self.availability.mark_reported_online(&notice.backend_id),
            BackendStatus::Offline => self.availability.mark_reported_offline(&notice.backend_id),
        }

        let previous = self.reported.insert(notice.backend_id.clone(), notice.status);
        if previous == Some(notice.status) {
            return;
        }
        match notice.status {
            BackendStatus::Online => tracing::info!(backend = %notice.backend_id, "backend status changed to ONLINE"),
            BackendStatus::Offline => tracing::warn!(backend = %notice.backend_id, "backend status changed to OFFLINE"),
        }
        self.bus.post(BackendStatusChanged {
            backend_id: notice.backend_id,
            previous,
            status: notice.status,
        });
    }

    fn malformed_payload(&self, admitted: &Admitted) {
        self.endpoint.reject(
            RejectReason::MalformedPayload,
            &format!("{} payload did not decode", admitted.envelope.message_type),
            Some(&admitted.correlation_id),
        );
    }

    /// The player is still on the old backend; put the session back in play.
    fn restore_after_failed_transfer(&self, player_id: Uuid) {
        let Some(session) = self.sessions.find_by_player(player_id) else {
            return;
        };
        if session.state() != SessionState::Transferring {
            return;
        }
        let restored = session
            .transition_to(SessionState::Handshaking)
            .and_then(|_| session.transition_to(SessionState::Playing));
        match restored {
            Ok(_) => tracing::info!(%player_id, "transfer failed, session back to PLAYING"),
            Err(e) => tracing::warn!(%player_id, error = %e, "could not restore session after failed transfer"),
        }
    }
}

/// Advances a session to PLAYING on `backend_id`. A session mid-transfer
/// passes through HANDSHAKING first.
fn authenticate(session: &PlayerSession, backend_id: &str) -> Result<(), SessionError> {
    if session.state() == SessionState::Transferring {
        session.transition_to(SessionState::Handshaking)?;
    }
    session.transition_to(SessionState::Playing)?;
    session.set_selected_backend_id(backend_id);
    Ok(())
}
