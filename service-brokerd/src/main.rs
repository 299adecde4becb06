mod config;
mod registry;
mod registry_manager;
mod mdns;
mod proxy;
mod api;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::proxy::Dispatcher;
use crate::registry::Registry;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("service_brokerd=info"))
        )
        .init();

    tracing::info!("Starting service-brokerd");

    // Config file is optional; every section has defaults
    let config = match std::env::args().nth(1) {
        Some(config_path) => {
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path))?;
            tracing::info!("Loaded config from {}", config_path);
            config
        }
        None => Config::default(),
    };

    // Bind first so a taken port fails before discovery starts
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("Server listening on http://{}", config.api.listen);

    let registry = Registry::new();

    // Create mDNS daemon, optionally pinned to one interface
    let mdns_daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;
    if let Some(interface) = &config.discovery.interface {
        mdns_daemon
            .disable_interface(mdns_sd::IfKind::All)
            .context("Failed to disable default interfaces")?;
        mdns_daemon
            .enable_interface(interface.as_str())
            .with_context(|| format!("Failed to enable interface {}", interface))?;
    }

    // Discovery and HTTP are cancelled separately so shutdown can be sequenced
    let discovery_cancel = CancellationToken::new();
    let server_cancel = CancellationToken::new();

    // Spawn mDNS browser task
    let (browser_tx, browser_rx) = mpsc::channel(256);
    let browser_cancel = discovery_cancel.clone();
    let browser_daemon = mdns_daemon.clone();
    let service_type = config.discovery.service_type.clone();
    let browser_handle = tokio::spawn(async move {
        if let Err(e) = mdns::browser::run_browser(browser_daemon, service_type, browser_tx, browser_cancel).await {
            tracing::error!("mDNS browser error: {}", e);
        }
    });

    // Spawn registry manager task
    let mgr_handle = tokio::spawn(registry_manager::run(registry.clone(), browser_rx));

    // Build API router
    let app_state = api::routes::AppState {
        registry: registry.clone(),
        dispatcher: Dispatcher::new(&config.proxy),
    };
    let app = api::routes::router(app_state);

    // Run server with graceful shutdown
    let shutdown = server_cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");

    // Stop discovery and release the multicast socket before closing HTTP
    discovery_cancel.cancel();
    let timeout = Duration::from_secs(config.discovery.shutdown_timeout_secs);
    if tokio::time::timeout(timeout, async {
        let _ = tokio::join!(browser_handle, mgr_handle);
    })
    .await
    .is_err()
    {
        tracing::warn!("Discovery did not stop within {:?}", timeout);
    }

    shutdown_daemon(mdns_daemon, timeout).await;

    server_cancel.cancel();
    if let Err(e) = server_handle.await {
        tracing::error!("Server task failed: {}", e);
    }

    tracing::info!("HTTP server closed");
    Ok(())
}

async fn shutdown_daemon(daemon: ServiceDaemon, timeout: Duration) {
    let status = match daemon.shutdown() {
        Ok(status) => status,
        Err(e) => {
            tracing::error!("Failed to shutdown mDNS daemon: {}", e);
            return;
        }
    };

    match tokio::time::timeout(timeout, status.recv_async()).await {
        Ok(Ok(status)) => tracing::info!("mDNS daemon stopped: {:?}", status),
        Ok(Err(e)) => tracing::warn!("mDNS daemon status channel closed: {}", e),
        Err(_) => tracing::warn!("mDNS daemon did not stop within {:?}", timeout),
    }
}
