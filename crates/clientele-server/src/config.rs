use std::str::FromStr;
use std::time::Duration;

use clientele_core::{HealthCheck, ServiceRegistration};
use clientele_discovery::{ConsulConfig, RetryPolicy};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const SERVICE_TAGS: [&str; 5] = ["user", "api", "microservice", "rust", "axum"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Process settings, read from the environment once at boot.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service_name: String,
    pub service_host: String,
    pub service_port: u16,
    /// Address other services use to reach us; registered with the registry.
    pub service_address: String,
    pub consul_host: String,
    pub consul_port: u16,
    pub consul_token: Option<String>,
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,
    pub deregister_after: Duration,
    pub registration_grace: Duration,
    pub registration_attempts: u32,
    pub registration_delay: Duration,
    pub outbound_timeout: Duration,
    pub database_url: String,
    pub log_level: String,
    pub require_auth: bool,
    pub allowed_origins: Vec<String>,
}

#[cfg(test)]
impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None).expect("defaults are valid")
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let secs = |key: &'static str, default: u64| parse(&lookup, key, default).map(Duration::from_secs);

        Ok(Self {
            service_name: text("SERVICE_NAME", "user-service"),
            service_host: text("SERVICE_HOST", "0.0.0.0"),
            service_port: parse(&lookup, "SERVICE_PORT", 8000)?,
            service_address: text("SERVICE_ADDRESS", "user-service"),
            consul_host: text("CONSUL_HOST", "consul"),
            consul_port: parse(&lookup, "CONSUL_PORT", 8500)?,
            consul_token: lookup("CONSUL_TOKEN").filter(|t| !t.is_empty()),
            health_check_interval: secs("HEALTH_CHECK_INTERVAL", 30)?,
            health_check_timeout: secs("HEALTH_CHECK_TIMEOUT", 10)?,
            deregister_after: secs("DEREGISTER_AFTER", 30)?,
            registration_grace: secs("REGISTRATION_GRACE", 5)?,
            registration_attempts: parse(&lookup, "REGISTRATION_ATTEMPTS", 5)?,
            registration_delay: secs("REGISTRATION_DELAY", 5)?,
            outbound_timeout: secs("OUTBOUND_TIMEOUT", 30)?,
            database_url: text("DATABASE_URL", "clientele.db"),
            log_level: text("LOG_LEVEL", "info"),
            require_auth: flag(&lookup, "REQUIRE_AUTH", false)?,
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_else(default_origins),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service_host, self.service_port)
    }

    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.service_name, VERSION)
    }

    pub fn registration(&self) -> ServiceRegistration {
        ServiceRegistration::new(&self.service_name, &self.service_address, self.service_port)
            .with_tags(SERVICE_TAGS)
            .with_health_check(HealthCheck {
                path: "/health".to_string(),
                interval: self.health_check_interval,
                timeout: self.health_check_timeout,
                deregister_after: self.deregister_after,
            })
    }

    pub fn consul_config(&self) -> ConsulConfig {
        ConsulConfig::new(&self.consul_host, self.consul_port).with_token(self.consul_token.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            grace: self.registration_grace,
            attempts: self.registration_attempts,
            delay: self.registration_delay,
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, in any case.
fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}

fn default_origins() -> Vec<String> {
    ["http://localhost", "http://localhost:80", "http://localhost:3000", "http://localhost:3001", "http://localhost:8080", "http://localhost:8081"]
        .into_iter()
        .map(String::from)
        .collect()
}
