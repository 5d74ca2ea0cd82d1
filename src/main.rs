//! docpress server binary.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use docpress::api::{self, AppState};
use docpress::jobs::JobRegistry;
use docpress::server_config::ServerConfig;
use docpress::store::{JobStore, MemoryStore};
use docpress::Fetcher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docpress=info,tower_http=warn")),
        )
        .init();

    let config = ServerConfig::from_env().context("failed to read configuration")?;

    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        Fetcher::new(&config.user_agent, config.max_body_bytes)
            .context("failed to build HTTP client")?,
    );
    let registry = Arc::new(JobRegistry::new(
        Arc::clone(&store),
        fetcher,
        config.registry_grace,
    ));
    Arc::clone(&registry).start_cleanup_task();

    let state = AppState {
        store,
        registry: Arc::clone(&registry),
        defaults: Arc::new(config.clone()),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .context("server error")?;

    Ok(())
}

/// Resolve on ctrl-c; running jobs get a cooperative cancel so in-flight
/// requests abort at their next suspension point.
async fn shutdown_signal(registry: Arc<JobRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        return;
    }
    tracing::info!("shutting down, cancelling {} running job(s)", registry.live_count());
    registry.cancel_all();
}
