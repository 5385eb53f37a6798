//! Error types for the routing layer.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// An observer denied the connection. The reason is the observer's.
    #[error("routing denied: {0}")]
    Denied(String),

    /// An observer overrode the backend with an id nobody configured.
    /// This is a misconfiguration, not a per-connection failure.
    #[error("unknown backend override {0:?}")]
    UnknownOverride(String),

    /// Neither the strategy's pick nor the default backend exists.
    #[error("default backend {0:?} is not registered")]
    MissingDefault(String),

    /// A second override or deny on a decision that was already made.
    #[error("routing decision already finalized")]
    DecisionFinalized,

    /// The in-flight decision cap is reached.
    #[error("routing overloaded ({limit} decisions in flight)")]
    Overloaded { limit: usize },
}

impl From<handoff_guard::GuardError> for RoutingError {
    fn from(err: handoff_guard::GuardError) -> Self {
        match err {
            handoff_guard::GuardError::Saturated { limit } => Self::Overloaded { limit },
        }
    }
}
