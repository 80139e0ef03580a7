use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::protocol::HttpMethod;

/// Registry-side health check attached to a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub path: String,
    pub interval: Duration,
    pub timeout: Duration,
    /// How long the check may stay critical before the registry drops the entry.
    pub deregister_after: Duration,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            deregister_after: Duration::from_secs(30),
        }
    }
}

/// This process's entry in the registry. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub service_name: String,
    pub instance_id: String,
    pub address: String,
    pub port: u16,
    pub tags: BTreeSet<String>,
    pub health_check: HealthCheck,
}

impl ServiceRegistration {
    pub fn new(service_name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        let service_name = service_name.into();
        Self {
            instance_id: Self::instance_id_for(&service_name, port),
            service_name,
            address: address.into(),
            port,
            tags: BTreeSet::new(),
            health_check: HealthCheck::default(),
        }
    }

    pub fn instance_id_for(service_name: &str, port: u16) -> String {
        format!("{service_name}-{port}")
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = health_check;
        self
    }

    /// URL the registry polls to decide whether this instance is passing.
    pub fn health_url(&self) -> String {
        format!("http://{}:{}{}", self.address, self.port, self.health_check.path)
    }
}

/// Point-in-time answer to "where is service X"; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedService {
    pub address: String,
    pub port: u16,
    pub tags: BTreeSet<String>,
}

impl ResolvedService {
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("http://{}:{}{}", self.address, self.port, path)
        } else {
            format!("http://{}:{}/{}", self.address, self.port, path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub service_name: String,
    pub path: String,
    pub method: HttpMethod,
    pub body: Option<Value>,
}

impl OutboundRequest {
    pub fn new(service_name: impl Into<String>, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            path: path.into(),
            method,
            body: None,
        }
    }

    pub fn get(service_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(service_name, HttpMethod::Get, path)
    }

    pub fn post(service_name: impl Into<String>, path: impl Into<String>, body: Value) -> Self {
        Self::new(service_name, HttpMethod::Post, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_is_name_and_port() {
        let reg = ServiceRegistration::new("user-service", "user-service", 8000);
        assert_eq!(reg.instance_id, "user-service-8000");
        assert_eq!(reg.health_url(), "http://user-service:8000/health");
    }

    #[test]
    fn resolved_url_joins_path() {
        let svc = ResolvedService {
            address: "10.0.0.7".into(),
            port: 3000,
            tags: BTreeSet::new(),
        };
        assert_eq!(svc.url("/health"), "http://10.0.0.7:3000/health");
        assert_eq!(svc.url("order/user/1"), "http://10.0.0.7:3000/order/user/1");
    }
}
