use serde::Deserialize;

/// Routing settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Where players go when nothing else decides. Must name a
    /// configured backend.
    pub default_backend_id: String,
    /// Cap on decisions running at once. Excess decisions fail with
    /// `Overloaded` instead of waiting.
    pub max_in_flight: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_backend_id: "lobby".to_string(),
            max_in_flight: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial_fills_defaults() {
        let config: RoutingConfig = serde_json::from_str(r#"{"default_backend_id":"hub"}"#).unwrap();
        assert_eq!(config.default_backend_id, "hub");
        assert_eq!(config.max_in_flight, 1024);
    }
}
