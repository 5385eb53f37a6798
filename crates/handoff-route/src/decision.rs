use crate::RoutingError;

/// The one override-or-deny an observer may make for a decision.
///
/// Whichever of [`suggest_backend`](Self::suggest_backend) and
/// [`deny`](Self::deny) is called first wins; any later call fails with
/// [`RoutingError::DecisionFinalized`] and changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingDecision {
    override_backend_id: Option<String>,
    deny_reason: Option<String>,
}

impl RoutingDecision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suggest_backend(&mut self, backend_id: impl Into<String>) -> Result<(), RoutingError> {
        self.ensure_open()?;
        self.override_backend_id = Some(backend_id.into());
        Ok(())
    }

    pub fn deny(&mut self, reason: impl Into<String>) -> Result<(), RoutingError> {
        self.ensure_open()?;
        self.deny_reason = Some(reason.into());
        Ok(())
    }

    pub fn override_backend_id(&self) -> Option<&str> {
        self.override_backend_id.as_deref()
    }

    pub fn deny_reason(&self) -> Option<&str> {
        self.deny_reason.as_deref()
    }

    pub fn is_decided(&self) -> bool {
        self.override_backend_id.is_some() || self.deny_reason.is_some()
    }

    fn ensure_open(&self) -> Result<(), RoutingError> {
        if self.is_decided() {
            tracing::error!(decision = ?self, "second override/deny on a routing decision");
            return Err(RoutingError::DecisionFinalized);
        }
        Ok(())
    }
}
