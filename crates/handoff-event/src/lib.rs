//! Lifecycle notifications for the handoff proxy.
//!
//! Extensions observe moments like "player connected" or "about to pick
//! a backend" by registering a typed closure on an [`EventBus`]:
//!
//! ```text
//! bus.register::<RoutePreSelect>(EventPriority::High, |event| { ... })
//!
//! post(event) → Lowest → Low → Normal → High → Highest → Monitor
//! ```
//!
//! Observers of one priority run in registration order. An observer that
//! returns `Err` or panics is logged and skipped; the rest still run.
//!
//! Event types live in the crates that post them. This crate only knows
//! the [`Event`] trait.

mod bus;

pub use bus::{EventBus, ObserverError, ObserverOptions, ObserverResult, Subscription};

/// Delivery tier. Lower tiers run first; `Monitor` runs last and is
/// meant for observers that only look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EventPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    Monitor,
}

/// Something that can be posted to an [`EventBus`].
///
/// Cancellable events override [`is_cancelled`](Event::is_cancelled);
/// once it returns `true`, only observers registered with
/// `receive_cancelled` still see the event.
pub trait Event: Send + 'static {
    fn is_cancelled(&self) -> bool {
        false
    }
}
