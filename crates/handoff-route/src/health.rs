//! Reachability as routing sees it.

/// Tells routing which backends to steer around for now.
pub trait BackendHealth: Send + Sync + 'static {
    fn is_temporarily_unavailable(&self, backend_id: &str) -> bool;
}

/// Treats every backend as reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl BackendHealth for AlwaysAvailable {
    fn is_temporarily_unavailable(&self, _backend_id: &str) -> bool {
        false
    }
}
