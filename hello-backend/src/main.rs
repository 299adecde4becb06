mod advertise;
mod api;
mod config;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};

const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hello_backend=info"))
        )
        .init();

    let port = config::port_from_env()?;
    let hostname = advertise::system_hostname()?;
    let instance_name = advertise::instance_name(&hostname, port);

    // Bind HTTP server before advertising
    let listen = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind to {}", listen))?;

    tracing::info!("Server listening on http://{}", listen);

    let mdns_daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;
    let service_info = advertise::register_backend(&mdns_daemon, &instance_name, &hostname, port)?;

    let app = api::router(api::AppState {
        instance_name: Arc::from(instance_name.as_str()),
    });

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");

    // Withdraw the advertisement before the port goes away
    if let Err(e) = advertise::unregister_backend(&mdns_daemon, &service_info, UNREGISTER_TIMEOUT).await {
        tracing::error!("Failed to unregister mDNS service: {}", e);
    }
    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    cancel.cancel();
    let _ = server_handle.await;

    tracing::info!("HTTP server closed");
    Ok(())
}
