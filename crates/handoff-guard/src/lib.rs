//! Shared protection primitives for the handoff proxy.
//!
//! - [`Clock`]: the injectable time source every expiry check reads.
//! - [`ReplayProtector`]: a bounded, time-windowed "seen before" set.
//!   Backends key it by `(backend, player, nonce)` to stop token replay;
//!   the control plane keys it by `(sender, type, nonce)`.
//! - [`InFlightLimiter`]: a lease counter that fails fast instead of
//!   queueing. Bounds routing decisions and control-plane ingress.
//! - [`FixedWindowRateLimiter`]: per-key event budget per window.
//!
//! # How it fits in the stack
//!
//! ```text
//! Token / Control / Routing layers (above)  ← own one instance each
//!     ↕
//! Guard layer (this crate)  ← lock-free or per-key operations only
//! ```
//!
//! None of these types hold a global lock across an operation: maps are
//! sharded (`DashMap`) and counters are atomics.

mod clock;
mod error;
mod inflight;
mod rate_limit;
mod replay;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::GuardError;
pub use inflight::{InFlightLease, InFlightLimiter};
pub use rate_limit::{FixedWindowRateLimiter, RateLimitConfig};
pub use replay::{ReplayConfig, ReplayProtector};
