//! The observer registry and dispatcher.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::{Event, EventPriority};

/// Error type an observer may return.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;
pub type ObserverResult = Result<(), ObserverError>;

/// How an observer is registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObserverOptions {
    pub priority: EventPriority,
    /// Deliver even after an earlier observer cancelled the event.
    pub receive_cancelled: bool,
}

impl From<EventPriority> for ObserverOptions {
    fn from(priority: EventPriority) -> Self {
        Self {
            priority,
            receive_cancelled: false,
        }
    }
}

/// Handle returned by registration; pass it to [`EventBus::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "keep the subscription to unregister the observer later"]
pub struct Subscription {
    event: TypeId,
    id: u64,
}

struct Handler<E>(Box<dyn Fn(&mut E) -> ObserverResult + Send + Sync>);

#[derive(Clone)]
struct Registration {
    id: u64,
    options: ObserverOptions,
    handler: Arc<dyn Any + Send + Sync>,
}

/// Typed, priority-ordered observer registry.
///
/// Registration and posting may happen from any thread. Observers run on
/// the posting thread, with no lock held, so an observer may itself
/// register, unregister or post.
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<HashMap<TypeId, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an infallible observer at `priority`.
    pub fn register<E, F>(&self, priority: EventPriority, observer: F) -> Subscription
    where
        E: Event,
        F: Fn(&mut E) + Send + Sync + 'static,
    {
        self.register_with(priority.into(), move |event: &mut E| {
            observer(event);
            Ok(())
        })
    }

    /// Registers a fallible observer. An `Err` is logged, never propagated.
    pub fn register_with<E, F>(&self, options: ObserverOptions, observer: F) -> Subscription
    where
        E: Event,
        F: Fn(&mut E) -> ObserverResult + Send + Sync + 'static,
    {
        let event = TypeId::of::<E>();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            id,
            options,
            handler: Arc::new(Handler::<E>(Box::new(observer))),
        };

        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let list = observers.entry(event).or_default();
        // After every observer of the same or lower priority.
        let at = list.partition_point(|r| r.options.priority <= options.priority);
        list.insert(at, registration);

        tracing::trace!(event = type_name::<E>(), priority = ?options.priority, "observer registered");
        Subscription { event, id }
    }

    /// Removes an observer. Returns `false` if it was already gone.
    pub fn unregister(&self, subscription: Subscription) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = observers.get_mut(&subscription.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != subscription.id);
        let removed = list.len() != before;
        if list.is_empty() {
            observers.remove(&subscription.event);
        }
        removed
    }

    pub fn observer_count<E: Event>(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Delivers `event` to every observer of its type and hands it back,
    /// including whatever the observers changed.
    pub fn post<E: Event>(&self, mut event: E) -> E {
        let targets = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default();

        for registration in targets {
            if event.is_cancelled() && !registration.options.receive_cancelled {
                continue;
            }
            let Some(handler) = registration.handler.downcast_ref::<Handler<E>>() else {
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| (handler.0)(&mut event))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(event = type_name::<E>(), %error, "observer failed");
                }
                Err(_) => {
                    tracing::error!(event = type_name::<E>(), "observer panicked");
                }
            }
        }
        event
    }
}
