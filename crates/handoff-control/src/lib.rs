//! Control plane between the proxy and its backends.
//!
//! Proxy and backend exchange [`ControlEnvelope`]s over the `handoff:control`
//! messaging channel:
//!
//! ```text
//! proxy   ──TRANSFER_REQUEST──▶  backend   (redirect this player)
//! proxy   ◀──TRANSFER_RESULT───  backend   (OK / FAILED + reason)
//! proxy   ◀──TOKEN_VALIDATION──  backend   (accepted / rejected the proxy token)
//! proxy   ◀──BACKEND_STATUS────  backend   (ONLINE heartbeat, OFFLINE on stop)
//! ```
//!
//! Every inbound packet passes the same admission steps before it is
//! dispatched, and every refusal is tallied under a stable
//! [`RejectReason`]:
//!
//! ```text
//! size → in-flight lease → decode → sender → timestamp → payload size → replay → dispatch
//! ```
//!
//! Ingress never queues. When `max_in_flight` packets are being handled,
//! the next one is refused as `INGRESS_BACKPRESSURE`.
//!
//! [`ControlEnvelope`]: handoff_wire::ControlEnvelope

mod availability;
mod backend;
mod config;
mod endpoint;
mod error;
mod events;
mod proxy;
mod reject;

pub use availability::{Availability, BackendAvailability};
pub use backend::{BackendControlPlane, ConnectionRedirect, DEFAULT_HEARTBEAT_INTERVAL, RedirectError};
pub use config::ControlPlaneConfig;
pub use endpoint::SenderPolicy;
pub use error::ControlError;
pub use events::{BackendStatusChanged, TokenValidated, TransferCompleted};
pub use proxy::ProxyControlPlane;
pub use reject::RejectReason;

/// Messaging channel every control envelope travels on.
pub const CONTROL_CHANNEL: &str = "handoff:control";
