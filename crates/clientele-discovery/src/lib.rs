//! Registry-backed discovery for the customer service: registration
//! lifecycle, peer resolution and the outbound call executor.

pub mod client;
pub mod lifecycle;
pub mod registry;
pub mod resolver;

pub use client::{ServiceClient, LOGIN_SERVICE, ORDER_SERVICE};
pub use lifecycle::{LifecycleCoordinator, LifecycleState, RetryPolicy};
pub use registry::{ConsulConfig, ConsulRegistry, ServiceRegistry};
pub use resolver::ServiceResolver;
