//! The backend side: proxy-token enforcement and the backend control plane.

use std::sync::Arc;

use handoff_control::{BackendControlPlane, ConnectionRedirect, DEFAULT_HEARTBEAT_INTERVAL};
use handoff_guard::{Clock, ReplayConfig};
use handoff_token::{
    HandshakeInterceptor, ProxyTokenValidator, StaticSecrets, TokenRejectReason, TokenValidationError,
    ValidatedToken,
};
use handoff_transport::Messaging;
use handoff_wire::{ConnectFrame, ValidationOutcome};
use uuid::Uuid;

use crate::{BackendNodeConfig, HandoffError};

/// The result of a handshake the backend let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeVerdict {
    /// The proxy token checked out.
    Verified(ValidatedToken),
    /// Permissive mode admitted a client whose token failed.
    Unverified(TokenValidationError),
}

/// Everything a game server embeds to sit behind the proxy.
pub struct BackendNode {
    config: BackendNodeConfig,
    interceptor: HandshakeInterceptor,
    control: Arc<BackendControlPlane>,
}

impl BackendNode {
    /// Validates the config and starts the backend control plane.
    /// Call [`start_heartbeat`](Self::start_heartbeat) once a tokio
    /// runtime is running.
    pub fn start(
        config: BackendNodeConfig,
        messaging: Arc<dyn Messaging>,
        redirect: Arc<dyn ConnectionRedirect>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HandoffError> {
        config.validate()?;

        let mut secrets = StaticSecrets::new(&config.proxy_secret);
        if let Some(previous) = &config.previous_proxy_secret {
            secrets = secrets.with_previous(previous);
        }
        let validator = ProxyTokenValidator::new(config.server_id.clone(), Arc::new(secrets), Arc::clone(&clock))
            .require_certificates(config.require_certificates);
        let replay = ReplayConfig {
            window_millis: config.replay_window_millis,
            max_entries: config.replay_max_entries,
        }
        .validated();
        let interceptor = HandshakeInterceptor::new(validator, replay, Arc::clone(&clock));

        let control = BackendControlPlane::start(
            config.effective_control(),
            messaging,
            config.expected_sender_id.clone(),
            config.server_id.clone(),
            config.proxy_connect_address(),
            redirect,
            clock,
        )?;

        if !config.enforce_proxy {
            tracing::warn!(server_id = %config.server_id, "proxy enforcement is off; unverified clients will be admitted");
        }
        Ok(Self {
            config,
            interceptor,
            control,
        })
    }

    pub fn server_id(&self) -> &str {
        &self.config.server_id
    }

    pub fn is_enforcing(&self) -> bool {
        self.config.enforce_proxy
    }

    pub fn control(&self) -> &Arc<BackendControlPlane> {
        &self.control
    }

    /// Checks the proxy token in a client's connect frame and reports the
    /// outcome to the proxy.
    ///
    /// In enforce mode a failed check is an error and the client should
    /// be disconnected with [`REJECTED_CLIENT_MESSAGE`](handoff_token::REJECTED_CLIENT_MESSAGE).
    pub fn handle_handshake(&self, frame: &ConnectFrame) -> Result<HandshakeVerdict, HandoffError> {
        let checked = self
            .interceptor
            .intercept_for_player(frame.referral_data.as_deref(), frame.player_id);

        match checked {
            Ok(validated) => {
                self.notify(validated.token.player_id(), ValidationOutcome::Accepted, None);
                Ok(HandshakeVerdict::Verified(validated))
            }
            Err(rejected) => {
                if let Some(player_id) = frame.player_id {
                    self.notify(player_id, ValidationOutcome::Rejected, Some(rejected.reason));
                }
                if self.config.enforce_proxy {
                    tracing::warn!(
                        player_id = ?frame.player_id,
                        reason = %rejected.reason,
                        detail = %rejected.detail,
                        "proxy token rejected"
                    );
                    Err(rejected.into())
                } else {
                    tracing::warn!(
                        player_id = ?frame.player_id,
                        reason = %rejected.reason,
                        detail = %rejected.detail,
                        "proxy token rejected, admitting in permissive mode"
                    );
                    Ok(HandshakeVerdict::Unverified(rejected))
                }
            }
        }
    }

    /// Announces ONLINE now and every two seconds until shutdown. Must be
    /// called inside a tokio runtime.
    pub fn start_heartbeat(&self) {
        self.control.spawn_heartbeat(DEFAULT_HEARTBEAT_INTERVAL);
    }

    /// Stops the heartbeat and announces OFFLINE.
    pub async fn shutdown(&self) {
        self.control.shutdown().await;
    }

    fn notify(&self, player_id: Uuid, outcome: ValidationOutcome, reason: Option<TokenRejectReason>) {
        if let Err(e) = self.control.send_token_validation_notice(player_id, outcome, reason) {
            tracing::warn!(%player_id, %outcome, error = %e, "could not send token validation notice");
        }
    }
}
