//! Client for a Consul-compatible agent HTTP API.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use clientele_core::{CatalogEntry, DiscoveryError, ResolvedService, ServiceRegistration};

/// Narrow view of the registry backend.
///
/// Every operation collapses backend failures into its "negative" answer
/// (`false`, `None`, empty list) so callers never branch on registry errors.
/// A lookup miss and an unreachable registry are indistinguishable here.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn register(&self, registration: &ServiceRegistration) -> bool;
    /// Removing an id the registry does not know counts as success.
    async fn deregister(&self, instance_id: &str) -> bool;
    /// First instance of `service_name` whose health check is passing.
    async fn lookup(&self, service_name: &str) -> Option<ResolvedService>;
    async fn list_all(&self) -> Vec<CatalogEntry>;
    async fn is_available(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ConsulConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub request_timeout: Duration,
}

impl ConsulConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            token: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

pub struct ConsulRegistry {
    http: HttpClient,
    base_url: Url,
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    tags: Vec<&'a str>,
    address: &'a str,
    port: u16,
    check: AgentServiceCheck,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck {
    #[serde(rename = "HTTP")]
    http: String,
    interval: String,
    timeout: String,
    deregister_critical_service_after: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    service: HealthService,
    #[serde(default)]
    node: Option<HealthNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthService {
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthNode {
    #[serde(default)]
    address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

fn consul_duration(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

impl ConsulRegistry {
    pub fn new(config: ConsulConfig) -> Result<Self, DiscoveryError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DiscoveryError::RegistryUnavailable(format!("invalid registry url {}: {e}", config.base_url))
        })?;
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DiscoveryError::RegistryUnavailable(e.to_string()))?;

        info!(url = %base_url, "registry client initialised");
        Ok(Self {
            http,
            base_url,
            token: config.token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DiscoveryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DiscoveryError::RegistryUnavailable(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<reqwest::Response, DiscoveryError> {
        let mut request = self.http.request(method, url);
        if let Some(ref token) = self.token {
            request = request.header("X-Consul-Token", token);
        }
        if let Some(body) = body {
            request = request.header("Content-Type", "application/json").body(body);
        }
        request
            .send()
            .await
            .map_err(|e| DiscoveryError::RegistryUnavailable(e.to_string()))
    }

    async fn rejected(response: reqwest::Response) -> DiscoveryError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        DiscoveryError::RegistryRejected { status, body }
    }

    pub async fn try_register(&self, registration: &ServiceRegistration) -> Result<(), DiscoveryError> {
        let check = &registration.health_check;
        let payload = AgentServiceRegistration {
            id: &registration.instance_id,
            name: &registration.service_name,
            tags: registration.tags.iter().map(String::as_str).collect(),
            address: &registration.address,
            port: registration.port,
            check: AgentServiceCheck {
                http: registration.health_url(),
                interval: consul_duration(check.interval),
                timeout: consul_duration(check.timeout),
                deregister_critical_service_after: consul_duration(check.deregister_after),
            },
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| DiscoveryError::MalformedResponse(e.to_string()))?;

        let url = self.endpoint(&["v1", "agent", "service", "register"])?;
        let response = self.send(Method::PUT, url, Some(body)).await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(())
    }

    pub async fn try_deregister(&self, instance_id: &str) -> Result<(), DiscoveryError> {
        let url = self.endpoint(&["v1", "agent", "service", "deregister", instance_id])?;
        let response = self.send(Method::PUT, url, None).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        match Self::rejected(response).await {
            // older agents answer 500 for ids they never held
            DiscoveryError::RegistryRejected { body, .. } if body.contains("Unknown service") => Ok(()),
            other => Err(other),
        }
    }

    pub async fn try_lookup(&self, service_name: &str) -> Result<Option<ResolvedService>, DiscoveryError> {
        let mut url = self.endpoint(&["v1", "health", "service", service_name])?;
        url.query_pairs_mut().append_pair("passing", "true");

        let response = self.send(Method::GET, url, None).await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        let entries: Vec<HealthEntry> = response
            .json()
            .await
            .map_err(|e| DiscoveryError::MalformedResponse(e.to_string()))?;

        Ok(entries.into_iter().next().map(|entry| {
            let address = if entry.service.address.is_empty() {
                entry.node.map(|n| n.address).unwrap_or_default()
            } else {
                entry.service.address
            };
            ResolvedService {
                address,
                port: entry.service.port,
                tags: entry.service.tags.unwrap_or_default().into_iter().collect::<BTreeSet<_>>(),
            }
        }))
    }

    pub async fn try_list_all(&self) -> Result<Vec<CatalogEntry>, DiscoveryError> {
        let url = self.endpoint(&["v1", "agent", "services"])?;
        let response = self.send(Method::GET, url, None).await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        let services: std::collections::BTreeMap<String, AgentService> = response
            .json()
            .await
            .map_err(|e| DiscoveryError::MalformedResponse(e.to_string()))?;

        Ok(services
            .into_values()
            .map(|s| CatalogEntry {
                id: s.id,
                name: s.service,
                address: s.address,
                port: s.port,
                tags: s.tags.unwrap_or_default(),
            })
            .collect())
    }

    pub async fn try_leader(&self) -> Result<String, DiscoveryError> {
        let url = self.endpoint(&["v1", "status", "leader"])?;
        let response = self.send(Method::GET, url, None).await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        response
            .json::<String>()
            .await
            .map_err(|e| DiscoveryError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    async fn register(&self, registration: &ServiceRegistration) -> bool {
        match self.try_register(registration).await {
            Ok(()) => {
                info!(instance_id = %registration.instance_id, "service registered");
                true
            }
            Err(e) => {
                error!(instance_id = %registration.instance_id, error = %e, "service registration failed");
                false
            }
        }
    }

    async fn deregister(&self, instance_id: &str) -> bool {
        match self.try_deregister(instance_id).await {
            Ok(()) => {
                info!(%instance_id, "service deregistered");
                true
            }
            Err(e) => {
                error!(%instance_id, error = %e, "service deregistration failed");
                false
            }
        }
    }

    async fn lookup(&self, service_name: &str) -> Option<ResolvedService> {
        match self.try_lookup(service_name).await {
            Ok(Some(found)) => {
                debug!(service = %service_name, address = %found.address, port = found.port, "service found");
                Some(found)
            }
            Ok(None) => {
                warn!(service = %service_name, "no passing instance");
                None
            }
            Err(e) => {
                error!(service = %service_name, error = %e, "service lookup failed");
                None
            }
        }
    }

    async fn list_all(&self) -> Vec<CatalogEntry> {
        match self.try_list_all().await {
            Ok(services) => {
                info!(count = services.len(), "listed registry services");
                services
            }
            Err(e) => {
                error!(error = %e, "listing registry services failed");
                Vec::new()
            }
        }
    }

    async fn is_available(&self) -> bool {
        match self.try_leader().await {
            Ok(leader) => !leader.is_empty(),
            Err(e) => {
                error!(error = %e, "registry not available");
                false
            }
        }
    }
}
