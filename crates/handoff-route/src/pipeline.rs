//! The single decision procedure behind initial and transfer routing.

use std::fmt;
use std::sync::Arc;

use handoff_event::EventBus;
use handoff_guard::InFlightLimiter;

use crate::{
    AlwaysAvailable, BackendHealth, BackendInfo, RoutePostSelect, RoutePreSelect, RoutingContext, RoutingError,
    StrategyRouter,
};

/// Why a backend was chosen, as reported to post-selection observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionReason {
    /// The configured default (static strategy or fallback).
    Default,
    /// An installed routing strategy.
    Strategy,
    /// A pre-selection observer's override.
    Override,
    /// The backend the context asked for.
    Transfer,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "DEFAULT",
            Self::Strategy => "STRATEGY",
            Self::Override => "OVERRIDE",
            Self::Transfer => "TRANSFER",
        })
    }
}

/// The outcome of a successful decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSelection {
    pub backend: BackendInfo,
    pub reason: SelectionReason,
}

/// Runs routing decisions under an in-flight cap, with observers.
pub struct RoutingPipeline {
    router: StrategyRouter,
    bus: Arc<EventBus>,
    limiter: InFlightLimiter,
    health: Arc<dyn BackendHealth>,
}

impl RoutingPipeline {
    pub fn new(router: StrategyRouter, bus: Arc<EventBus>, max_in_flight: usize) -> Self {
        Self::with_limiter(router, bus, InFlightLimiter::new(max_in_flight))
    }

    /// Uses a limiter that may be shared with other pipelines.
    pub fn with_limiter(router: StrategyRouter, bus: Arc<EventBus>, limiter: InFlightLimiter) -> Self {
        Self {
            router,
            bus,
            limiter,
            health: Arc::new(AlwaysAvailable),
        }
    }

    /// Backends `health` reports as unavailable are swapped for the
    /// initial pick when that one is usable.
    pub fn with_health(mut self, health: Arc<dyn BackendHealth>) -> Self {
        self.health = health;
        self
    }

    pub fn find_backend(&self, id: &str) -> Option<BackendInfo> {
        self.router.find_backend(id)
    }

    pub fn in_flight(&self) -> usize {
        self.limiter.in_flight()
    }

    /// Picks the backend for a newly connected player.
    pub fn select_initial_backend(&self, context: &RoutingContext) -> Result<RouteSelection, RoutingError> {
        self.decide(context, true)
    }

    /// Picks the backend for a transfer or reconnect.
    pub fn select_backend(&self, context: &RoutingContext) -> Result<RouteSelection, RoutingError> {
        self.decide(context, false)
    }

    fn decide(&self, context: &RoutingContext, initial: bool) -> Result<RouteSelection, RoutingError> {
        let _lease = self.limiter.try_acquire().inspect_err(|e| {
            tracing::warn!(error = %e, "routing decision refused");
        })?;

        let pre = self.bus.post(RoutePreSelect {
            context: context.clone(),
            decision: Default::default(),
        });
        if let Some(reason) = pre.decision.deny_reason() {
            tracing::info!(player_id = ?context.player_id, %reason, "routing denied by observer");
            return Err(RoutingError::Denied(reason.to_string()));
        }

        let selection = match pre.decision.override_backend_id() {
            Some(id) => {
                let backend = self.router.find_backend(id).ok_or_else(|| {
                    tracing::error!(backend = %id, "routing override names an unknown backend");
                    RoutingError::UnknownOverride(id.to_string())
                })?;
                RouteSelection {
                    backend,
                    reason: SelectionReason::Override,
                }
            }
            None => {
                let (backend, mut reason) = self.router.select(context, initial)?;
                if context.requested_backend_id.as_deref() == Some(backend.id.as_str()) {
                    reason = SelectionReason::Transfer;
                }
                RouteSelection { backend, reason }
            }
        };
        let selection = self.avoid_unavailable(context, selection);

        tracing::debug!(
            player_id = ?context.player_id,
            backend = %selection.backend.id,
            reason = %selection.reason,
            "backend selected"
        );
        self.bus.post(RoutePostSelect {
            context: context.clone(),
            backend_id: selection.backend.id.clone(),
            reason: selection.reason,
        });
        Ok(selection)
    }

    /// Swaps a backend in its unreachable cooldown for the initial pick.
    /// Observers are not asked again; if the initial pick is the same
    /// backend or also unavailable, the original selection stands.
    fn avoid_unavailable(&self, context: &RoutingContext, selection: RouteSelection) -> RouteSelection {
        if !self.health.is_temporarily_unavailable(&selection.backend.id) {
            return selection;
        }
        let initial_context = RoutingContext {
            requested_backend_id: None,
            ..context.clone()
        };
        let Ok((backend, reason)) = self.router.select(&initial_context, true) else {
            return selection;
        };
        if backend.id == selection.backend.id || self.health.is_temporarily_unavailable(&backend.id) {
            return selection;
        }
        tracing::warn!(
            requested = %selection.backend.id,
            fallback = %backend.id,
            reason = "BACKEND_TEMPORARILY_UNAVAILABLE",
            "routing around unavailable backend"
        );
        RouteSelection { backend, reason }
    }
}
