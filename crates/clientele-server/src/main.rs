mod auth;
mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clientele_core::CustomerStore;
use clientele_db::SqliteCustomerStore;
use clientele_discovery::{ConsulRegistry, LifecycleCoordinator, ServiceClient, ServiceRegistry};

use crate::config::Settings;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).ok();

    tracing::info!(service = %settings.service_name, "starting customer service");

    let store = SqliteCustomerStore::new(&settings.database_url).context("failed to open database")?;
    store.ping().context("database connection failed")?;
    let store: Arc<dyn CustomerStore> = Arc::new(store);

    let registry: Arc<dyn ServiceRegistry> = Arc::new(ConsulRegistry::new(settings.consul_config())?);
    let services = ServiceClient::new(registry.clone(), &settings.user_agent())?
        .with_default_timeout(settings.outbound_timeout);
    let lifecycle = Arc::new(LifecycleCoordinator::new(registry, settings.retry_policy()));

    let listener = tokio::net::TcpListener::bind(settings.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_address()))?;

    // Peers must be able to find us before we take traffic.
    lifecycle
        .start(settings.registration())
        .await
        .context("refusing to serve while unregistered")?;

    let state = AppState {
        store,
        services,
        lifecycle: lifecycle.clone(),
        settings: Arc::new(settings),
    };

    let app = routes::router(state).route(
        "/metrics",
        get(move || {
            let rendered = handle.render();
            async move { rendered }
        }),
    );

    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(lifecycle))
        .await
        .context("server error")?;

    tracing::info!("customer service stopped");
    Ok(())
}

/// Resolves on SIGINT/SIGTERM after deregistering, so the registry stops
/// handing out our address before the listener closes.
async fn shutdown_signal(lifecycle: Arc<LifecycleCoordinator>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
    lifecycle.stop().await;
}
