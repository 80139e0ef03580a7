use std::sync::Arc;

use clientele_core::CustomerStore;
use clientele_discovery::{LifecycleCoordinator, ServiceClient};

use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CustomerStore>,
    pub services: ServiceClient,
    pub lifecycle: Arc<LifecycleCoordinator>,
    pub settings: Arc<Settings>,
}
