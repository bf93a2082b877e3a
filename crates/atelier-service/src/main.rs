//! Atelier service - HTTP API for credits and job reconciliation.
//!
//! This is the main entry point for the atelier service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_engine::{spawn_sweeps, HttpComputeProvider, LogNotifier};
use atelier_service::{create_router, AppState, ServiceConfig};
use atelier_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,atelier=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting atelier service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        provider_base_url = %config.provider_base_url,
        "Service configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    // Wire the engine
    let provider = Arc::new(HttpComputeProvider::new(
        config.provider_base_url.clone(),
        config.provider_api_key.clone(),
    ));
    let state = AppState::new(
        store.clone(),
        provider,
        Arc::new(LogNotifier),
        config.clone(),
    );

    // Background sweeps: recovery poll, timeout, reconcile, bundle expiry
    spawn_sweeps(
        store,
        state.provider.clone(),
        state.lifecycle.clone(),
        state.reconciler.clone(),
        state.credits.clone(),
        config.sweep_config(),
    );
    tracing::info!("Background sweeps started");

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
