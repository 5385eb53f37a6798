//! Unified error type for the handoff facade.

use std::net::IpAddr;

use handoff_control::ControlError;
use handoff_guard::GuardError;
use handoff_route::RoutingError;
use handoff_session::{SessionError, SessionId};
use handoff_token::{TokenError, TokenValidationError};
use handoff_transport::TransportError;
use handoff_wire::WireError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` attribute on each layer variant generates the `From`
/// impl, so `?` converts layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// A frame or payload couldn't be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A limiter refused.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// A token couldn't be issued, or a secret is too weak.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// A presented token was refused.
    #[error(transparent)]
    TokenRejected(#[from] TokenValidationError),

    /// Sending through a link or messaging endpoint failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An illegal state change, or a missing session or link.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Routing denied, overloaded, or misconfigured.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// A control-plane send failed.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// The configuration failed validation. One line per problem.
    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),

    /// The first packet of a connection isn't a usable connect frame.
    #[error("malformed connect frame: {0}")]
    MalformedConnect(&'static str),

    /// Too many connection attempts from one address.
    #[error("connect rate limit exceeded for {0}")]
    RateLimited(IpAddr),

    /// The session has no player id yet.
    #[error("session {0} has no player id")]
    UnidentifiedSession(SessionId),

    /// The player is already on the requested backend.
    #[error("player is already on backend {0}")]
    AlreadyOnBackend(String),

    /// A global tracing subscriber is already installed.
    #[error("tracing init failed: {0}")]
    Telemetry(String),
}
