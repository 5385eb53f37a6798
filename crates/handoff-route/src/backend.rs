//! Known backends.

use std::collections::HashMap;

use serde::Deserialize;

/// Where a backend listens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl BackendInfo {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
        }
    }
}

/// Backend id → endpoint lookup, consulted by routing and the control
/// plane.
pub trait BackendRegistry: Send + Sync + 'static {
    fn get(&self, id: &str) -> Option<BackendInfo>;

    fn all(&self) -> Vec<BackendInfo>;

    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

/// A fixed backend list, usually straight from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticBackendRegistry {
    order: Vec<String>,
    by_id: HashMap<String, BackendInfo>,
}

impl StaticBackendRegistry {
    /// Later entries with a duplicate id replace earlier ones.
    pub fn new(backends: impl IntoIterator<Item = BackendInfo>) -> Self {
        let mut registry = Self::default();
        for backend in backends {
            if registry.by_id.insert(backend.id.clone(), backend.clone()).is_none() {
                registry.order.push(backend.id);
            }
        }
        registry
    }
}

impl BackendRegistry for StaticBackendRegistry {
    fn get(&self, id: &str) -> Option<BackendInfo> {
        self.by_id.get(id).cloned()
    }

    /// In configuration order.
    fn all(&self) -> Vec<BackendInfo> {
        self.order.iter().filter_map(|id| self.by_id.get(id).cloned()).collect()
    }
}
