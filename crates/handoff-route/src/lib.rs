//! Routing layer for the handoff proxy: which backend gets this player?
//!
//! Every decision, initial or transfer, goes through one procedure:
//!
//! ```text
//! lease ──→ post RoutePreSelect(decision) ──→ denied?   → RoutingError::Denied
//!                                         └─→ override? → must be a known backend
//!                                         └─→ strategy  → unknown id falls back to default
//!       ──→ unavailable?  → initial pick instead, if that one is usable
//!       ──→ post RoutePostSelect(backend, reason) ──→ release lease
//! ```
//!
//! An observer may override or deny once per decision; a second attempt
//! fails with [`RoutingError::DecisionFinalized`]. An unknown override id
//! is a configuration error and fails the whole decision, while an
//! unknown id from a strategy only logs and falls back.
//!
//! The availability fallback is part of the same decision: observers are
//! asked once, and post-selection observers only hear about the backend
//! the player is actually sent to.
//!
//! # How it fits in the stack
//!
//! ```text
//! Proxy facade / transfer service (above)
//!     ↕
//! Routing layer (this crate)
//!     ↕
//! Event bus (observers) + Guard (in-flight cap) (below)
//! ```

mod backend;
mod config;
mod context;
mod decision;
mod error;
mod events;
mod health;
mod pipeline;
mod strategy;

pub use backend::{BackendInfo, BackendRegistry, StaticBackendRegistry};
pub use config::RoutingConfig;
pub use context::RoutingContext;
pub use decision::RoutingDecision;
pub use error::RoutingError;
pub use events::{RoutePostSelect, RoutePreSelect};
pub use health::{AlwaysAvailable, BackendHealth};
pub use pipeline::{RouteSelection, RoutingPipeline, SelectionReason};
pub use strategy::{RoutingStrategy, StaticRoutingStrategy, StrategyRegistry, StrategyRouter};
