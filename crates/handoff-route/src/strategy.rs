//! Pluggable backend choice and the router that resolves its answer.

use std::sync::{Arc, PoisonError, RwLock};

use crate::{BackendInfo, BackendRegistry, RoutingContext, RoutingError, SelectionReason};

/// Picks a backend id for a connection. The id doesn't have to exist;
/// the router checks it and falls back to the default backend.
pub trait RoutingStrategy: Send + Sync + 'static {
    fn select_initial_backend(&self, context: &RoutingContext) -> String;

    fn select_backend(&self, context: &RoutingContext) -> String;
}

/// Default backend for new players, the requested backend for transfers.
#[derive(Debug, Clone)]
pub struct StaticRoutingStrategy {
    default_backend_id: String,
}

impl StaticRoutingStrategy {
    pub fn new(default_backend_id: impl Into<String>) -> Self {
        Self {
            default_backend_id: default_backend_id.into(),
        }
    }
}

impl RoutingStrategy for StaticRoutingStrategy {
    fn select_initial_backend(&self, _context: &RoutingContext) -> String {
        self.default_backend_id.clone()
    }

    fn select_backend(&self, context: &RoutingContext) -> String {
        context
            .requested_backend_id
            .clone()
            .unwrap_or_else(|| self.default_backend_id.clone())
    }
}

struct Installed {
    name: String,
    strategy: Arc<dyn RoutingStrategy>,
}

/// The slot an extension installs its strategy into. At most one
/// strategy is installed at a time.
#[derive(Default)]
pub struct StrategyRegistry {
    installed: RwLock<Option<Installed>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `strategy`, returning the name of the one it replaced.
    pub fn install(&self, name: impl Into<String>, strategy: Arc<dyn RoutingStrategy>) -> Option<String> {
        let name = name.into();
        tracing::info!(strategy = %name, "routing strategy installed");
        self.installed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Installed { name, strategy })
            .map(|old| old.name)
    }

    /// Removes the installed strategy. Returns `false` if there was none.
    pub fn uninstall(&self) -> bool {
        self.installed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn installed_name(&self) -> Option<String> {
        self.installed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|i| i.name.clone())
    }

    fn current(&self) -> Option<Arc<dyn RoutingStrategy>> {
        self.installed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|i| Arc::clone(&i.strategy))
    }
}

/// Asks the installed strategy (or the static one) and resolves the
/// answer against the backend registry.
pub struct StrategyRouter {
    backends: Arc<dyn BackendRegistry>,
    strategies: Arc<StrategyRegistry>,
    fallback: StaticRoutingStrategy,
    default_backend_id: String,
}

impl StrategyRouter {
    pub fn new(
        backends: Arc<dyn BackendRegistry>,
        strategies: Arc<StrategyRegistry>,
        default_backend_id: impl Into<String>,
    ) -> Self {
        let default_backend_id = default_backend_id.into();
        Self {
            backends,
            strategies,
            fallback: StaticRoutingStrategy::new(default_backend_id.clone()),
            default_backend_id,
        }
    }

    pub fn find_backend(&self, id: &str) -> Option<BackendInfo> {
        self.backends.get(id)
    }

    /// `Strategy` when an installed strategy's pick was used, `Default`
    /// when the static strategy answered or the pick was unknown.
    pub fn select(&self, context: &RoutingContext, initial: bool) -> Result<(BackendInfo, SelectionReason), RoutingError> {
        let installed = self.strategies.current();
        let strategy: &dyn RoutingStrategy = match &installed {
            Some(strategy) => strategy.as_ref(),
            None => &self.fallback,
        };
        let picked = if initial {
            strategy.select_initial_backend(context)
        } else {
            strategy.select_backend(context)
        };

        if let Some(backend) = self.backends.get(&picked) {
            let reason = if installed.is_some() {
                SelectionReason::Strategy
            } else {
                SelectionReason::Default
            };
            return Ok((backend, reason));
        }

        tracing::warn!(
            backend = %picked,
            default = %self.default_backend_id,
            "routing strategy returned unknown backend, falling back to default"
        );
        self.backends
            .get(&self.default_backend_id)
            .map(|backend| (backend, SelectionReason::Default))
            .ok_or_else(|| RoutingError::MissingDefault(self.default_backend_id.clone()))
    }
}
