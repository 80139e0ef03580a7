use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client as HttpClient, Method};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use clientele_core::{
    CallError, HttpMethod, OutboundRequest, OutboundResult, ResolvedService, TokenValidation,
};

use crate::registry::ServiceRegistry;
use crate::resolver::ServiceResolver;

pub const LOGIN_SERVICE: &str = "login-service";
pub const ORDER_SERVICE: &str = "order-service";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound executor: resolves a peer by name and calls it over HTTP.
///
/// Failures come back as [`CallError`] values and are never retried here;
/// whether to retry, swallow or propagate is up to the call site.
#[derive(Clone)]
pub struct ServiceClient {
    resolver: ServiceResolver,
    http: HttpClient,
    default_timeout: Duration,
}

impl ServiceClient {
    pub fn new(registry: Arc<dyn ServiceRegistry>, user_agent: &str) -> Result<Self, CallError> {
        let http = HttpClient::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| CallError::Transport(e.to_string()))?;
        Ok(Self {
            resolver: ServiceResolver::new(registry),
            http,
            default_timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &ServiceResolver {
        &self.resolver
    }

    /// Issues `request` under a single deadline (`timeout` or the client default).
    pub async fn call(&self, request: OutboundRequest, timeout: Option<Duration>) -> OutboundResult {
        let service = request.service_name.clone();
        let result = self
            .execute(request, timeout.unwrap_or(self.default_timeout))
            .await;
        record_outcome(service, &result);
        result
    }

    /// Like [`call`](Self::call) but gives up as soon as `cancel` fires.
    pub async fn call_cancellable(
        &self,
        request: OutboundRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> OutboundResult {
        let service = request.service_name.clone();
        let path = request.path.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(%service, %path, "outbound call cancelled");
                let result = Err(CallError::Cancelled);
                record_outcome(service, &result);
                result
            }
            result = self.call(request, timeout) => result,
        }
    }

    async fn execute(&self, request: OutboundRequest, timeout: Duration) -> OutboundResult {
        let target = self.resolver.resolve(&request.service_name).await?;
        self.send_to(&target, &request, timeout).await
    }

    async fn send_to(
        &self,
        target: &ResolvedService,
        request: &OutboundRequest,
        timeout: Duration,
    ) -> OutboundResult {
        let url = target.url(&request.path);
        info!(service = %request.service_name, method = %request.method, %url, "outbound request");

        let mut builder = self
            .http
            .request(to_method(request.method), &url)
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .header("X-Request-Id", Uuid::new_v4().to_string());
        if request.method.carries_body() {
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }
        }

        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(CallError::Remote {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "response": text })))
    }

    /// Asks the login service whether `token` is valid. Any failure is a "no".
    pub async fn validate_token(&self, token: &str) -> TokenValidation {
        let request = OutboundRequest::post(LOGIN_SERVICE, "/auth/validate", json!({ "token": token }));
        match self.call(request, None).await {
            Ok(reply) => TokenValidation {
                valid: reply.get("valid").and_then(Value::as_bool).unwrap_or(false),
                user_id: reply.get("user_id").and_then(scalar_to_string),
                email: reply.get("email").and_then(scalar_to_string),
            },
            Err(e) => {
                error!(error = %e, "auth token validation failed");
                TokenValidation::invalid()
            }
        }
    }

    /// Tells the order service about a customer event. Best effort: a failure
    /// is logged and reported as `false`, never raised.
    pub async fn notify_user_event(&self, user_id: &str, event: &str, data: Value) -> bool {
        let request = OutboundRequest::post(
            ORDER_SERVICE,
            "/notifications/user-event",
            json!({
                "user_id": user_id,
                "event": event,
                "data": data,
                "timestamp": clientele_core::time::now(),
            }),
        );
        match self.call(request, None).await {
            Ok(_) => {
                info!(%user_id, %event, "order service notified");
                true
            }
            Err(e) => {
                warn!(%user_id, %event, error = %e, "failed to notify order service");
                false
            }
        }
    }

    pub async fn check_service_health(&self, service_name: &str) -> bool {
        self.call(OutboundRequest::get(service_name, "/health"), None)
            .await
            .is_ok()
    }

    /// Subset of `service_names` whose health probe currently succeeds.
    pub async fn available_services(&self, service_names: &[&str]) -> Vec<String> {
        let probes = service_names.iter().map(|name| async move {
            self.check_service_health(name)
                .await
                .then(|| name.to_string())
        });
        let available: Vec<String> = join_all(probes).await.into_iter().flatten().collect();
        info!(?available, "available services");
        available
    }

    pub async fn user_orders(&self, user_id: &str) -> Vec<Value> {
        let request = OutboundRequest::get(ORDER_SERVICE, format!("/order/user/{user_id}"));
        match self.call(request, None).await {
            Ok(mut reply) => match reply.get_mut("orders").map(Value::take) {
                Some(Value::Array(orders)) => orders,
                _ => Vec::new(),
            },
            Err(e) => {
                error!(%user_id, error = %e, "failed to get user orders");
                Vec::new()
            }
        }
    }
}

fn record_outcome(service: String, result: &OutboundResult) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    metrics::counter!("outbound_calls_total", "service" => service, "outcome" => outcome).increment(1);
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn transport(e: reqwest::Error) -> CallError {
    CallError::Transport(e.to_string())
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedRegistry;
    use httpmock::prelude::*;

    fn client_for(peers: &[(&str, &MockServer)]) -> ServiceClient {
        let registry = FixedRegistry::default();
        for (name, server) in peers {
            registry.insert(name, "127.0.0.1", server.port());
        }
        ServiceClient::new(Arc::new(registry), "user-service/test").unwrap()
    }

    #[tokio::test]
    async fn unresolvable_service_makes_no_network_attempt() {
        let client = ServiceClient::new(Arc::new(FixedRegistry::default()), "test").unwrap();
        let result = client
            .call(
                OutboundRequest::post(ORDER_SERVICE, "/notifications/user-event", json!({"user_id": "1"})),
                None,
            )
            .await;
        assert_eq!(result, Err(CallError::ServiceUnavailable("order-service".into())));
    }

    #[tokio::test]
    async fn json_reply_is_returned_as_is() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/echo")
                .header("content-type", "application/json")
                .header_exists("x-request-id")
                .json_body(json!({"a": 1}));
            then.status(201).json_body(json!({"ok": true}));
        });

        let client = client_for(&[("echo", &server)]);
        let reply = client
            .call(OutboundRequest::post("echo", "/echo", json!({"a": 1})), None)
            .await
            .unwrap();
        assert_eq!(reply, json!({"ok": true}));
        mock.assert();
    }

    #[tokio::test]
    async fn non_json_success_is_wrapped() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(200).body("OK");
        });

        let client = client_for(&[("peer", &server)]);
        let reply = client.call(OutboundRequest::get("peer", "/health"), None).await;
        assert_eq!(reply, Ok(json!({"response": "OK"})));
    }

    #[tokio::test]
    async fn error_status_is_remote_not_transport() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/order/user/42");
            then.status(404).body("no such user");
        });

        let client = client_for(&[(ORDER_SERVICE, &server)]);
        let err = client
            .call(OutboundRequest::get(ORDER_SERVICE, "/order/user/42"), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CallError::Remote {
                status: 404,
                body: "no such user".into()
            }
        );
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn refused_connection_is_transport() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let registry = FixedRegistry::default();
        registry.insert("gone", "127.0.0.1", port);
        let client = ServiceClient::new(Arc::new(registry), "test").unwrap();

        let err = client
            .call(OutboundRequest::get("gone", "/health"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Transport(_)), "{err:?}");
    }

    #[tokio::test]
    async fn slow_peer_hits_the_deadline() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(2)).body("late");
        });

        let client = client_for(&[("slow", &server)]);
        let err = client
            .call(OutboundRequest::get("slow", "/slow"), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Transport(_)));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_call() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(5)).body("late");
        });

        let client = client_for(&[("slow", &server)]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = client
            .call_cancellable(OutboundRequest::get("slow", "/slow"), None, &cancel)
            .await;
        assert_eq!(result, Err(CallError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// Remembers the labels of every counter touched while installed.
    #[derive(Default)]
    struct LabelRecorder(std::sync::Mutex<Vec<Vec<(String, String)>>>);

    impl metrics::Recorder for LabelRecorder {
        fn describe_counter(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_gauge(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_histogram(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}

        fn register_counter(&self, key: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
            let labels = key
                .labels()
                .map(|l| (l.key().to_string(), l.value().to_string()))
                .collect();
            self.0.lock().unwrap().push(labels);
            metrics::Counter::noop()
        }

        fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            metrics::Gauge::noop()
        }

        fn register_histogram(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Histogram {
            metrics::Histogram::noop()
        }
    }

    #[test]
    fn cancelled_calls_are_counted() {
        let recorder = LabelRecorder::default();
        let registry = FixedRegistry::default();
        registry.insert("slow", "127.0.0.1", 9);
        let client = ServiceClient::new(Arc::new(registry), "user-service/test").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = metrics::with_local_recorder(&recorder, || {
            runtime.block_on(client.call_cancellable(OutboundRequest::get("slow", "/slow"), None, &cancel))
        });

        assert_eq!(result, Err(CallError::Cancelled));
        let seen = recorder.0.lock().unwrap();
        assert_eq!(
            *seen,
            vec![vec![
                ("service".to_string(), "slow".to_string()),
                ("outcome".to_string(), "cancelled".to_string()),
            ]]
        );
    }

    #[tokio::test]
    async fn body_is_dropped_for_get() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/things").body("");
            then.status(200).json_body(json!([]));
        });

        let client = client_for(&[("peer", &server)]);
        let request = OutboundRequest::get("peer", "/things").with_body(json!({"ignored": true}));
        assert_eq!(client.call(request, None).await, Ok(json!([])));
        mock.assert();
    }

    #[tokio::test]
    async fn token_validation_fails_closed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/auth/validate")
                .json_body(json!({"token": "good"}));
            then.status(200)
                .json_body(json!({"valid": true, "user_id": 7, "email": "a@x.com"}));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/auth/validate")
                .json_body(json!({"token": "bad"}));
            then.status(401).body("expired");
        });

        let client = client_for(&[(LOGIN_SERVICE, &server)]);
        let ok = client.validate_token("good").await;
        assert!(ok.valid);
        assert_eq!(ok.user_id.as_deref(), Some("7"));
        assert_eq!(ok.email.as_deref(), Some("a@x.com"));

        assert_eq!(client.validate_token("bad").await, TokenValidation::invalid());

        let no_login = ServiceClient::new(Arc::new(FixedRegistry::default()), "test").unwrap();
        assert!(!no_login.validate_token("good").await.valid);
    }

    #[tokio::test]
    async fn notification_failure_is_swallowed() {
        let client = ServiceClient::new(Arc::new(FixedRegistry::default()), "test").unwrap();
        assert!(!client.notify_user_event("1", "user_updated", json!({})).await);

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/notifications/user-event");
            then.status(200).json_body(json!({"received": true}));
        });
        let client = client_for(&[(ORDER_SERVICE, &server)]);
        assert!(client.notify_user_event("1", "user_updated", json!({"email": "a@x.com"})).await);
        mock.assert();
    }

    #[tokio::test]
    async fn health_probe_and_available_services() {
        let up = MockServer::start();
        up.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(json!({"status": "healthy"}));
        });
        let down = MockServer::start();
        down.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(503);
        });

        let client = client_for(&[(LOGIN_SERVICE, &up), (ORDER_SERVICE, &down)]);
        assert!(client.check_service_health(LOGIN_SERVICE).await);
        assert!(!client.check_service_health(ORDER_SERVICE).await);
        assert!(!client.check_service_health("unregistered").await);
        assert_eq!(
            client.available_services(&[LOGIN_SERVICE, ORDER_SERVICE]).await,
            vec![LOGIN_SERVICE.to_string()]
        );
    }

    #[tokio::test]
    async fn user_orders_reads_orders_field() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/order/user/9");
            then.status(200).json_body(json!({"orders": [{"id": "o1"}, {"id": "o2"}]}));
        });

        let client = client_for(&[(ORDER_SERVICE, &server)]);
        assert_eq!(client.user_orders("9").await.len(), 2);
        assert!(client.user_orders("10").await.is_empty());
    }
}
