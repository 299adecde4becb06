use std::collections::HashMap;
use std::time::Duration;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use anyhow::{Context, Result};
use shared::protocol::{HELLO_WORLD_PATH, SERVICE_TYPE};

const TXT_PATH: &str = "path";

/// Instance name advertised for this process: unique per host and port
pub fn instance_name(hostname: &str, port: u16) -> String {
    format!("backend-service-{}-{}", hostname, port)
}

pub fn system_hostname() -> Result<String> {
    Ok(hostname::get()
        .context("Failed to get system hostname")?
        .to_string_lossy()
        .to_string())
}

/// Advertise `instance_name` on every interface, letting the daemon fill in
/// the addresses.
pub fn register_backend(
    daemon: &ServiceDaemon,
    instance_name: &str,
    hostname: &str,
    port: u16,
) -> Result<ServiceInfo> {
    let host = format!("{}.local.", hostname.trim_end_matches(".local"));

    let txt_records = HashMap::from([
        (TXT_PATH.to_string(), HELLO_WORLD_PATH.to_string()),
    ]);

    let service_info = ServiceInfo::new(
        SERVICE_TYPE,
        instance_name,
        &host,
        "",
        port,
        txt_records,
    )
    .context("Failed to create ServiceInfo")?
    .enable_addr_auto();

    daemon
        .register(service_info.clone())
        .context("Failed to register mDNS service")?;

    tracing::info!(
        "Registered {} as {} on port {}",
        SERVICE_TYPE,
        instance_name,
        port
    );

    Ok(service_info)
}

/// Withdraw the advertisement and wait for the daemon to send the goodbye
pub async fn unregister_backend(
    daemon: &ServiceDaemon,
    service_info: &ServiceInfo,
    timeout: Duration,
) -> Result<()> {
    let status = daemon
        .unregister(service_info.get_fullname())
        .context("Failed to unregister mDNS service")?;

    let status = tokio::time::timeout(timeout, status.recv_async())
        .await
        .context("Timed out unregistering mDNS service")?
        .context("mDNS daemon dropped unregister status")?;

    tracing::info!("Unregistered {}: {:?}", service_info.get_fullname(), status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_name() {
        assert_eq!(instance_name("nas", 8080), "backend-service-nas-8080");
    }
}
