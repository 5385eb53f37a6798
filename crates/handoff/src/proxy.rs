//! `Proxy` builder and connection entry points.
//!
//! The proxy never touches sockets. The host's accept loop hands it the
//! first packet of each client connection plus a [`Link`] to that client;
//! the proxy answers with the backend to dial and the rewritten connect
//! frame to send it.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use handoff_control::{BackendAvailability, ProxyControlPlane};
use handoff_event::EventBus;
use handoff_guard::{Clock, FixedWindowRateLimiter, SystemClock};
use handoff_route::{
    BackendHealth, BackendInfo, RoutingContext, RoutingPipeline, SelectionReason, StaticBackendRegistry,
    StrategyRegistry, StrategyRouter,
};
use handoff_session::{PlayerConnected, PlayerDisconnected, PlayerSession, SessionId, SessionRegistry, SessionState};
use handoff_token::{
    ProxyTokenIssuer, RotatingSecrets, StaticSecrets, TRANSFER_TOKEN_PREFIX, TransferTokenIssuer,
    TransferTokenValidator, fingerprint,
};
use handoff_transport::{Link, Messaging};
use handoff_wire::ConnectFrame;
use uuid::Uuid;

use crate::{HandoffError, ProxyConfig, TransferService};

/// What the host does next with an accepted connection: dial `backend`
/// and send it `forwarded_frame`.
#[derive(Debug, Clone)]
pub struct AcceptedConnection {
    pub session: Arc<PlayerSession>,
    pub backend: BackendInfo,
    pub reason: SelectionReason,
    /// The client's connect frame carrying a fresh proxy token as
    /// referral data.
    pub forwarded_frame: Vec<u8>,
}

/// Builder for a [`Proxy`].
///
/// # Example
///
/// ```rust,ignore
/// let proxy = Proxy::builder(config)
///     .messaging(udp_server)
///     .build()?;
/// ```
pub struct ProxyBuilder {
    config: ProxyConfig,
    messaging: Option<Arc<dyn Messaging>>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
    strategies: Arc<StrategyRegistry>,
}

impl ProxyBuilder {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            messaging: None,
            clock: Arc::new(SystemClock),
            bus: Arc::new(EventBus::new()),
            strategies: Arc::new(StrategyRegistry::new()),
        }
    }

    /// The control-plane endpoint toward the backends. Required.
    pub fn messaging(mut self, messaging: Arc<dyn Messaging>) -> Self {
        self.messaging = Some(messaging);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shares an event bus the host already has observers on.
    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn strategies(mut self, strategies: Arc<StrategyRegistry>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Validates the config and starts the control plane.
    pub fn build(self) -> Result<Proxy, HandoffError> {
        let config = self.config;
        config.validate()?;
        let messaging = self
            .messaging
            .ok_or_else(|| HandoffError::Config(vec!["a messaging endpoint is required".to_string()]))?;
        let clock = self.clock;

        let mut secrets = StaticSecrets::new(&config.security.proxy_secret);
        if let Some(previous) = &config.security.previous_proxy_secret {
            secrets = secrets.with_previous(previous);
        }
        let secrets = Arc::new(RotatingSecrets::new(secrets));

        let backends = StaticBackendRegistry::new(config.backends.iter().cloned());
        let router = StrategyRouter::new(
            Arc::new(backends),
            Arc::clone(&self.strategies),
            config.routing.default_backend_id.clone(),
        );
        let availability = Arc::new(BackendAvailability::new(Arc::clone(&clock)));
        let routing = Arc::new(
            RoutingPipeline::new(router, Arc::clone(&self.bus), config.routing.max_in_flight)
                .with_health(Arc::clone(&availability) as Arc<dyn BackendHealth>),
        );

        let sessions = Arc::new(SessionRegistry::new());
        let allowed_senders: HashSet<String> = config.backends.iter().map(|b| b.id.clone()).collect();
        let control = ProxyControlPlane::start(
            config.effective_control(),
            messaging,
            allowed_senders,
            Arc::clone(&self.bus),
            Arc::clone(&sessions),
            Arc::clone(&availability),
            Arc::clone(&clock),
        )?;

        let transfers = TransferService::new(
            Arc::clone(&routing),
            TransferTokenIssuer::with_ttl(secrets.clone(), Arc::clone(&clock), config.security.transfer_token_ttl_millis),
            Arc::clone(&control),
        );

        tracing::info!(
            proxy_id = %config.proxy_id,
            backends = config.backends.len(),
            default_backend = %config.routing.default_backend_id,
            "proxy ready"
        );
        Ok(Proxy {
            proxy_tokens: ProxyTokenIssuer::new(
                secrets.clone(),
                Arc::clone(&clock),
                config.security.proxy_token_ttl_millis,
            ),
            transfer_tokens: TransferTokenValidator::new(secrets.clone(), Arc::clone(&clock)),
            connect_limiter: FixedWindowRateLimiter::new(config.connect_rate.clone(), clock),
            config,
            secrets,
            bus: self.bus,
            strategies: self.strategies,
            sessions,
            routing,
            availability,
            control,
            transfers,
        })
    }
}

/// The proxy side of the handoff layer.
pub struct Proxy {
    config: ProxyConfig,
    secrets: Arc<RotatingSecrets>,
    bus: Arc<EventBus>,
    strategies: Arc<StrategyRegistry>,
    sessions: Arc<SessionRegistry>,
    routing: Arc<RoutingPipeline>,
    availability: Arc<BackendAvailability>,
    control: Arc<ProxyControlPlane>,
    transfers: TransferService,
    proxy_tokens: ProxyTokenIssuer,
    transfer_tokens: TransferTokenValidator,
    connect_limiter: FixedWindowRateLimiter<IpAddr>,
}

impl Proxy {
    pub fn builder(config: ProxyConfig) -> ProxyBuilder {
        ProxyBuilder::new(config)
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Where an extension installs its routing strategy.
    pub fn strategies(&self) -> &Arc<StrategyRegistry> {
        &self.strategies
    }

    /// Rotate the signing secret here; the previous one stays accepted.
    pub fn secrets(&self) -> &Arc<RotatingSecrets> {
        &self.secrets
    }

    pub fn availability(&self) -> &Arc<BackendAvailability> {
        &self.availability
    }

    pub fn control(&self) -> &Arc<ProxyControlPlane> {
        &self.control
    }

    pub fn transfers(&self) -> &TransferService {
        &self.transfers
    }

    /// Handles the first packet of a client connection.
    ///
    /// On success the session is HANDSHAKING and waits for the backend's
    /// token-validation notice. On failure the session (if one was
    /// created) is already disconnected.
    pub fn accept_connection(
        &self,
        frame: &[u8],
        client: &Arc<dyn Link>,
        address: Option<SocketAddr>,
        client_cert_der: Option<&[u8]>,
    ) -> Result<AcceptedConnection, HandoffError> {
        if let Some(address) = address {
            if !self.connect_limiter.try_acquire(address.ip()) {
                tracing::warn!(%address, reason = "CONNECT_RATE_LIMIT", "connection refused");
                return Err(HandoffError::RateLimited(address.ip()));
            }
        }

        let frame = ConnectFrame::decode(frame, &self.config.limits).ok_or_else(|| {
            tracing::debug!(?address, reason = "MALFORMED_CONNECT", "connection refused");
            HandoffError::MalformedConnect("connect frame did not decode")
        })?;
        let player_id = frame
            .player_id
            .ok_or(HandoffError::MalformedConnect("connect frame has no player id"))?;

        let requested = self.transfer_target(&frame, player_id)?;

        let session = self.sessions.create();
        session.attach_client(client);
        if let Some(username) = &frame.username {
            session.set_username(username.clone());
        }
        if let Some(der) = client_cert_der {
            session.set_client_cert(fingerprint::sha256_base64url(der));
        }
        session.transition_to(SessionState::Handshaking)?;
        // One live session per player: a reconnect replaces the old one.
        if let Some(previous) = self.sessions.bind_player(&session, player_id) {
            let reason = if requested.is_some() { "transferred" } else { "replaced by a new connection" };
            self.announce_disconnect(&previous, Some(reason));
        }
        self.bus.post(PlayerConnected {
            session: Arc::clone(&session),
            address,
        });

        match self.route(&session, frame, address, requested) {
            Ok(accepted) => Ok(accepted),
            Err(e) => {
                tracing::info!(%player_id, error = %e, "connection refused after routing");
                self.disconnect(session.id(), Some(&e.to_string()));
                Err(e)
            }
        }
    }

    /// Records the backend connection the host opened for `session`.
    pub fn attach_backend(&self, session: SessionId, link: &Arc<dyn Link>) -> Result<(), HandoffError> {
        let session = self.sessions.get(session)?;
        session.attach_backend(link);
        if let Some(backend_id) = session.selected_backend_id() {
            self.availability.mark_available(&backend_id);
        }
        Ok(())
    }

    /// The host couldn't reach `backend_id`. Routing avoids it for a
    /// while.
    pub fn report_backend_unreachable(&self, backend_id: &str) {
        tracing::warn!(backend = %backend_id, "backend unreachable");
        self.availability.mark_unavailable(backend_id);
    }

    /// Forgets the session and tells observers. Returns `None` if it was
    /// already gone.
    pub fn disconnect(&self, session: SessionId, reason: Option<&str>) -> Option<Arc<PlayerSession>> {
        let removed = self.sessions.remove(session)?;
        self.announce_disconnect(&removed, reason);
        Some(removed)
    }

    /// Stops receiving control packets.
    pub fn shutdown(&self) {
        self.control.shutdown();
        tracing::info!(proxy_id = %self.config.proxy_id, "proxy stopped");
    }

    // -- Connection steps --

    /// The backend a presented transfer token points at. Referral data
    /// that isn't a transfer token is ignored; a transfer token that
    /// fails validation refuses the connection.
    fn transfer_target(&self, frame: &ConnectFrame, player_id: Uuid) -> Result<Option<String>, HandoffError> {
        let Some(encoded) = frame
            .referral_data
            .as_deref()
            .and_then(|data| std::str::from_utf8(data).ok())
            .map(|s| s.trim_matches(|c: char| c <= ' '))
            .filter(|s| !s.is_empty())
        else {
            return Ok(None);
        };

        match self.transfer_tokens.validate(encoded, player_id) {
            Ok(token) => match self.routing.find_backend(token.target_server_id()) {
                Some(backend) => {
                    tracing::debug!(%player_id, backend = %backend.id, "transfer token selects backend");
                    Ok(Some(backend.id))
                }
                None => {
                    tracing::warn!(%player_id, backend = %token.target_server_id(), "transfer token names an unknown backend");
                    Ok(None)
                }
            },
            Err(e) if encoded.starts_with(&format!("{TRANSFER_TOKEN_PREFIX}.")) => {
                tracing::warn!(%player_id, reason = %e.reason, detail = %e.detail, "transfer token rejected");
                Err(e.into())
            }
            Err(_) => Ok(None),
        }
    }

    fn announce_disconnect(&self, session: &Arc<PlayerSession>, reason: Option<&str>) {
        tracing::info!(
            session = %session.id(),
            player_id = ?session.player_id(),
            reason = reason.unwrap_or("-"),
            "player disconnected"
        );
        self.bus.post(PlayerDisconnected {
            session: Arc::clone(session),
            reason: reason.map(str::to_string),
        });
    }

    fn route(
        &self,
        session: &Arc<PlayerSession>,
        frame: ConnectFrame,
        address: Option<SocketAddr>,
        requested: Option<String>,
    ) -> Result<AcceptedConnection, HandoffError> {
        let mut context = RoutingContext::from_connect(&frame, address);
        context.requested_backend_id = requested;
        let player_id = context
            .player_id
            .ok_or(HandoffError::UnidentifiedSession(session.id()))?;
        let selection = if context.requested_backend_id.is_some() {
            self.routing.select_backend(&context)?
        } else {
            self.routing.select_initial_backend(&context)?
        };
        let backend_id = selection.backend.id.as_str();

        let token = self.proxy_tokens.issue(
            player_id,
            backend_id,
            session.client_cert(),
            self.config.security.proxy_cert_fingerprint.clone(),
        )?;
        let forwarded_frame = frame
            .with_referral(token.into_bytes(), self.config.referral.address())
            .encode(&self.config.limits)?;

        session.set_selected_backend_id(backend_id);
        tracing::info!(
            %player_id,
            username = ?context.username,
            backend = %backend_id,
            reason = %selection.reason,
            "player routed"
        );
        Ok(AcceptedConnection {
            session: Arc::clone(session),
            backend: selection.backend,
            reason: selection.reason,
            forwarded_frame,
        })
    }
}
