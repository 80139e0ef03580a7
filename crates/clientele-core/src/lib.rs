pub mod auth;
pub mod customer;
pub mod errors;
pub mod health;
pub mod protocol;
pub mod registration;
pub mod store;
pub mod time;

pub use auth::{Caller, TokenValidation};
pub use customer::{Customer, CustomerDraft, CustomerPatch};
pub use errors::{CallError, DiscoveryError, ValidationError};
pub use health::{HealthReport, HealthStatus};
pub use protocol::HttpMethod;
pub use registration::{CatalogEntry, HealthCheck, OutboundRequest, ResolvedService, ServiceRegistration};
pub use store::{CustomerStore, StoreError};

/// Result of an outbound call: the peer's JSON reply or a typed failure.
pub type OutboundResult = Result<serde_json::Value, CallError>;
