use std::sync::Arc;

use clientele_core::{CallError, ResolvedService};

use crate::registry::ServiceRegistry;

/// Turns a logical service name into an address, asking the registry every
/// time. Nothing is cached: registry membership is the only liveness signal.
#[derive(Clone)]
pub struct ServiceResolver {
    registry: Arc<dyn ServiceRegistry>,
}

impl ServiceResolver {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub async fn resolve(&self, service_name: &str) -> Result<ResolvedService, CallError> {
        self.registry
            .lookup(service_name)
            .await
            .ok_or_else(|| CallError::ServiceUnavailable(service_name.to_string()))
    }

    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }
}
