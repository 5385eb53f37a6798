//! Routing notifications.

use handoff_event::Event;

use crate::{RoutingContext, RoutingDecision, SelectionReason};

/// Posted before a backend is picked. Observers may call
/// `decision.suggest_backend` or `decision.deny`, once between them.
#[derive(Debug, Clone)]
pub struct RoutePreSelect {
    pub context: RoutingContext,
    pub decision: RoutingDecision,
}

impl Event for RoutePreSelect {}

/// Posted after a backend is picked. For observing only.
#[derive(Debug, Clone)]
pub struct RoutePostSelect {
    pub context: RoutingContext,
    pub backend_id: String,
    pub reason: SelectionReason,
}

impl Event for RoutePostSelect {}
