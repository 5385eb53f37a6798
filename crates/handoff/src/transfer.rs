//! Moving a connected player to another backend.

use std::sync::Arc;

use handoff_control::ProxyControlPlane;
use handoff_route::{RoutingContext, RoutingPipeline};
use handoff_session::{PlayerSession, SessionState};
use handoff_token::TransferTokenIssuer;
use handoff_wire::TransferRequest;
use uuid::Uuid;

use crate::HandoffError;

/// Starts transfers: routes, moves the session to TRANSFERRING and asks
/// the current backend to redirect the player.
///
/// The backend's TRANSFER_RESULT is handled by the control plane. A
/// failed result puts the session back to PLAYING; a successful one
/// leaves it TRANSFERRING until the player reconnects with the transfer
/// token.
pub struct TransferService {
    routing: Arc<RoutingPipeline>,
    issuer: TransferTokenIssuer,
    control: Arc<ProxyControlPlane>,
}

impl TransferService {
    pub(crate) fn new(routing: Arc<RoutingPipeline>, issuer: TransferTokenIssuer, control: Arc<ProxyControlPlane>) -> Self {
        Self {
            routing,
            issuer,
            control,
        }
    }

    /// Requests a move to `backend_id`. Returns the correlation id of
    /// the TRANSFER_REQUEST.
    ///
    /// Routing observers see the request and may override or deny it, so
    /// the player can end up somewhere other than `backend_id`.
    pub fn request_transfer(&self, session: &PlayerSession, backend_id: &str) -> Result<Uuid, HandoffError> {
        let player_id = session
            .player_id()
            .ok_or(HandoffError::UnidentifiedSession(session.id()))?;

        let selection = self
            .routing
            .select_backend(&RoutingContext::for_transfer(player_id, backend_id))?;
        let target = selection.backend.id;
        if session.selected_backend_id().as_deref() == Some(target.as_str()) {
            return Err(HandoffError::AlreadyOnBackend(target));
        }

        session.transition_to(SessionState::Transferring)?;
        let request = match self.issuer.issue_referral_data(player_id, &target) {
            Ok(referral_data) => TransferRequest {
                correlation_id: Uuid::new_v4(),
                player_id,
                target_backend_id: target.clone(),
                referral_data,
            },
            Err(e) => {
                restore(session);
                return Err(e.into());
            }
        };

        if let Err(e) = self.control.send_transfer_request(&request) {
            restore(session);
            return Err(e.into());
        }
        tracing::info!(
            %player_id,
            from = ?session.selected_backend_id(),
            to = %target,
            reason = %selection.reason,
            correlation_id = %request.correlation_id,
            "transfer requested"
        );
        Ok(request.correlation_id)
    }
}

/// Undoes the move to TRANSFERRING when the request never went out.
/// The control plane may already have done it on a synchronous failure.
fn restore(session: &PlayerSession) {
    if session.state() != SessionState::Transferring {
        return;
    }
    let restored = session
        .transition_to(SessionState::Handshaking)
        .and_then(|_| session.transition_to(SessionState::Playing));
    if let Err(e) = restored {
        tracing::warn!(session = %session.id(), error = %e, "could not restore session after transfer failure");
    }
}
