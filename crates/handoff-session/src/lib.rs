//! Session layer for the handoff proxy.
//!
//! A [`PlayerSession`] is the proxy's authoritative record of where one
//! client connection is in its lifecycle:
//!
//! ```text
//!   NEW ──→ HANDSHAKING ──→ PLAYING ──→ TRANSFERRING
//!    │           ↑  │          │             │
//!    │           │  │          │             │
//!    │           └──┼──────────┼─────────────┘
//!    ▼              ▼          ▼             ▼
//!   DISCONNECTED ←──┴──────────┴─────────────┘   (terminal)
//! ```
//!
//! The state lives in an atomic cell, so any task may read or advance it
//! without holding a lock. The session also tracks which client and
//! backend [`Link`](handoff_transport::Link) it is currently attached
//! to, but only weakly: the accept loop that owns the socket owns the
//! link.
//!
//! # How it fits in the stack
//!
//! ```text
//! Proxy facade / control plane (above)  ← create, advance, look up sessions
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Transport (links) + Event (lifecycle notifications) (below)
//! ```

mod error;
mod events;
mod registry;
mod session;
mod state;

pub use error::SessionError;
pub use events::{PlayerAuthenticated, PlayerConnected, PlayerDisconnected};
pub use registry::SessionRegistry;
pub use session::{PlayerSession, SessionId};
pub use state::SessionState;
