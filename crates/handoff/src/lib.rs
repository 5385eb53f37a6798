//! # Handoff
//!
//! The trust and session-continuity layer of a game reverse proxy.
//!
//! The proxy authenticates nothing itself. It stamps every forwarded
//! connect frame with a short-lived HMAC proxy token; the backend checks
//! the token, refuses replays, and tells the proxy over a
//! replay-protected control plane. Transfers between backends run over
//! the same control plane and carry a transfer token the player brings
//! back on reconnect.
//!
//! ```text
//! client ──connect──▶ Proxy::accept_connection ──forwarded frame + proxy token──▶ backend
//!                         │                                                     │
//!                         │   ◀──TOKEN_VALIDATION / BACKEND_STATUS──────────────┤ BackendNode
//!                         │   ──TRANSFER_REQUEST──▶  ◀──TRANSFER_RESULT─────────┘
//! ```
//!
//! This crate assembles the layers. Each one is usable on its own:
//!
//! | Crate | Provides |
//! |---|---|
//! | `handoff-wire` | connect frame, messaging frame, control envelope codecs |
//! | `handoff-guard` | clock, replay protector, in-flight and rate limiters |
//! | `handoff-token` | proxy/transfer tokens, secret rotation, handshake interceptor |
//! | `handoff-transport` | links, channel messaging, loopback and UDP endpoints |
//! | `handoff-event` | priority-ordered event bus |
//! | `handoff-session` | session state machine and registry |
//! | `handoff-route` | routing pipeline and strategies |
//! | `handoff-control` | control-plane services |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use handoff::prelude::*;
//!
//! handoff::telemetry::init_tracing("info")?;
//! let proxy = Proxy::builder(ProxyConfig::from_json_str(&json)?)
//!     .messaging(messaging)
//!     .build()?;
//! let accepted = proxy.accept_connection(&first_packet, &client_link, Some(peer), None)?;
//! // dial accepted.backend, send accepted.forwarded_frame, then:
//! proxy.attach_backend(accepted.session.id(), &backend_link)?;
//! ```

mod backend;
mod config;
mod error;
mod proxy;
pub mod telemetry;
mod transfer;

pub use backend::{BackendNode, HandshakeVerdict};
pub use config::{BackendNodeConfig, ProxyConfig, ReferralConfig, SecurityConfig};
pub use error::HandoffError;
pub use proxy::{AcceptedConnection, Proxy, ProxyBuilder};
pub use transfer::TransferService;

pub use handoff_control as control;
pub use handoff_event as event;
pub use handoff_guard as guard;
pub use handoff_route as route;
pub use handoff_session as session;
pub use handoff_token as token;
pub use handoff_transport as transport;
pub use handoff_wire as wire;

/// Common imports for hosts.
pub mod prelude {
    pub use crate::{
        AcceptedConnection, BackendNode, BackendNodeConfig, HandoffError, HandshakeVerdict, Proxy, ProxyConfig,
        TransferService,
    };
    pub use handoff_control::{ConnectionRedirect, RedirectError};
    pub use handoff_event::{EventBus, EventPriority};
    pub use handoff_session::{PlayerAuthenticated, PlayerConnected, PlayerDisconnected, SessionState};
    pub use handoff_token::REJECTED_CLIENT_MESSAGE;
    pub use handoff_transport::{Link, Messaging};
}
