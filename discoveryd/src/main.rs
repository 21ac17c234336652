mod config;
mod registry;
mod registry_manager;
mod reaper;
mod probe;
mod api;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::probe::HealthChecker;
use crate::registry_manager::RegistryHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("discoveryd=info"))
        )
        .init();

    tracing::info!("Starting discoveryd");

    // Load config; without a path the built-in defaults apply
    let config = match std::env::args().nth(1) {
        Some(config_path) => {
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path))?;
            tracing::info!("Loaded config from {}", config_path);
            config
        }
        None => {
            tracing::info!("No config file given, using defaults");
            Config::default()
        }
    };

    tracing::info!(
        "TTL {}s, reaping every {}s, probing every {}s",
        config.registry.ttl_secs,
        config.registry.reap_interval_secs,
        config.probe.interval_secs
    );

    // Start the registry thread
    let store = RegistryHandle::spawn();

    let checker = HealthChecker::new(&config.probe)?;

    // Bind before starting background work so a taken port fails fast
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("Discovery service listening on {}", config.api.listen);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn TTL reaper task
    let reaper_cancel = cancel.clone();
    let reaper_store = store.clone();
    let reaper_config = config.registry.clone();
    let reaper_handle = tokio::spawn(async move {
        if let Err(e) = reaper::run(reaper_store, reaper_config, reaper_cancel).await {
            tracing::error!("TTL reaper error: {}", e);
        }
    });

    // Spawn health prober task
    let prober_cancel = cancel.clone();
    let prober_store = store.clone();
    let prober_config = config.probe.clone();
    let prober_handle = tokio::spawn(async move {
        if let Err(e) = probe::prober::run(prober_store, checker, prober_config, prober_cancel).await {
            tracing::error!("Health prober error: {}", e);
        }
    });

    // Build API router
    let app_state = api::routes::AppState {
        store: store.clone(),
        registry: Arc::new(config.registry.clone()),
        trust_forwarded_headers: config.api.trust_forwarded_headers,
    };
    let app = api::routes::router(app_state);

    // Run server with graceful shutdown; peer addresses back registrations without an ip
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(reaper_handle, prober_handle, server_handle);

    // Shutdown registry thread
    if let Err(e) = store.shutdown().await {
        tracing::error!("Failed to shutdown registry: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
