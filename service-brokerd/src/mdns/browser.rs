use std::net::IpAddr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::{DaemonEvent, ServiceDaemon, ServiceEvent, ServiceInfo};
use anyhow::{Context, Result};
use chrono::Utc;
use shared::types::ServiceRecord;

/// Normalized discovery update, consumed by the registry manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Up(ServiceRecord),
    Down(String),
}

/// Browse `service_type` until `cancel` fires, pushing normalized events to `tx`.
/// Browsing is stopped before returning; dropping `tx` then tells the registry
/// manager that discovery is over.
pub async fn run_browser(
    daemon: ServiceDaemon,
    service_type: String,
    tx: mpsc::Sender<DiscoveryEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Starting mDNS discovery for {}", service_type);

    let receiver = daemon
        .browse(&service_type)
        .with_context(|| format!("Failed to browse {}", service_type))?;

    let monitor = match daemon.monitor() {
        Ok(monitor) => Some(monitor),
        Err(e) => {
            tracing::warn!("mDNS daemon monitor unavailable: {}", e);
            None
        }
    };

    let result = forward_events(receiver, monitor, &service_type, tx, cancel).await;

    if let Err(e) = daemon.stop_browse(&service_type) {
        tracing::warn!("Failed to stop browsing {}: {}", service_type, e);
    }
    tracing::info!("mDNS discovery stopped");

    result
}

/// Event loop over the daemon's browse and monitor channels.
pub async fn forward_events(
    receiver: flume::Receiver<ServiceEvent>,
    mut monitor: Option<flume::Receiver<DaemonEvent>>,
    service_type: &str,
    tx: mpsc::Sender<DiscoveryEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            event = receiver.recv_async() => {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("mDNS browse channel closed: {}", e);
                        break;
                    }
                };

                let update = match event {
                    ServiceEvent::ServiceResolved(info) => {
                        DiscoveryEvent::Up(convert_service_info(&info, service_type))
                    }
                    ServiceEvent::ServiceRemoved(_typ, fullname) => {
                        DiscoveryEvent::Down(instance_name(&fullname, service_type).to_string())
                    }
                    other => {
                        tracing::trace!("Ignoring mDNS event: {:?}", other);
                        continue;
                    }
                };

                if tx.send(update).await.is_err() {
                    tracing::warn!("Registry manager gone, stopping discovery");
                    break;
                }
            }

            Some(event) = next_daemon_event(&mut monitor) => {
                match event {
                    DaemonEvent::Error(e) => tracing::warn!("mDNS discovery error: {}", e),
                    other => tracing::debug!("mDNS daemon event: {:?}", other),
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("mDNS browser shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Next monitor event. A closed or missing monitor parks forever so the
/// select loop keeps serving browse events.
async fn next_daemon_event(monitor: &mut Option<flume::Receiver<DaemonEvent>>) -> Option<DaemonEvent> {
    let Some(rx) = monitor.as_ref() else {
        return std::future::pending().await;
    };
    match rx.recv_async().await {
        Ok(event) => Some(event),
        Err(_) => {
            tracing::debug!("mDNS daemon monitor closed");
            *monitor = None;
            None
        }
    }
}

/// Strip ".<service_type>" from a full DNS-SD name:
/// "backend-service-nas-8080._my-cool-app._tcp.local." -> "backend-service-nas-8080"
pub fn instance_name<'a>(fullname: &'a str, service_type: &str) -> &'a str {
    fullname
        .strip_suffix(service_type)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname)
}

/// Convert an mdns-sd ServiceInfo to a registry record
fn convert_service_info(info: &ServiceInfo, service_type: &str) -> ServiceRecord {
    let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    normalize(
        instance_name(info.get_fullname(), service_type),
        info.get_fullname(),
        info.get_hostname(),
        &addresses,
        info.get_port(),
    )
}

/// Build a record from the fields of an "up" event.
///
/// mdns-sd only reports addresses carried in the responder's own answer, so
/// the origin address is taken from that set: IPv4 first, then IPv6, then the
/// advertised hostname.
pub fn normalize(
    name: &str,
    fqdn: &str,
    hostname: &str,
    addresses: &[IpAddr],
    port: u16,
) -> ServiceRecord {
    // Address sets are unordered; sort so "first" is stable
    let mut addresses = addresses.to_vec();
    addresses.sort();

    let ipv4 = addresses.iter().find(|addr| addr.is_ipv4());
    let host = match ipv4 {
        Some(addr) => addr.to_string(),
        None => hostname.to_string(),
    };
    let reply_address = match ipv4.or_else(|| addresses.first()) {
        Some(addr) => addr.to_string(),
        None => hostname.to_string(),
    };

    ServiceRecord {
        name: name.to_string(),
        host,
        reply_address,
        port,
        fqdn: fqdn.to_string(),
        discovered_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const TYPE: &str = "_my-cool-app._tcp.local.";

    #[test]
    fn test_instance_name_strips_type() {
        assert_eq!(
            instance_name("backend-service-nas-8080._my-cool-app._tcp.local.", TYPE),
            "backend-service-nas-8080"
        );
        assert_eq!(instance_name("other._http._tcp.local.", TYPE), "other._http._tcp.local.");
    }

    #[test]
    fn test_normalize_prefers_ipv4() {
        let addresses = [
            IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
        ];
        let record = normalize("nas", "nas._my-cool-app._tcp.local.", "nas.local.", &addresses, 8080);

        assert_eq!(record.name, "nas");
        assert_eq!(record.host, "192.168.1.20");
        assert_eq!(record.reply_address, "192.168.1.20");
        assert_eq!(record.port, 8080);
        assert_eq!(record.fqdn, "nas._my-cool-app._tcp.local.");
    }

    #[test]
    fn test_normalize_ipv6_only_falls_back_to_hostname() {
        let addresses = [IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 1, 0, 0, 0, 1))];
        let record = normalize("nas", "nas._my-cool-app._tcp.local.", "nas.local.", &addresses, 8080);

        assert_eq!(record.host, "nas.local.");
        assert_eq!(record.reply_address, "fd00:0:0:1::1");
    }

    #[test]
    fn test_normalize_without_addresses() {
        let record = normalize("nas", "nas._my-cool-app._tcp.local.", "nas.local.", &[], 8080);
        assert_eq!(record.host, "nas.local.");
        assert_eq!(record.reply_address, "nas.local.");
    }

    #[test]
    fn test_normalize_is_order_independent() {
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let first = normalize("n", "f", "h", &[a, b], 1);
        let second = normalize("n", "f", "h", &[b, a], 1);
        assert_eq!(first.host, second.host);
        assert_eq!(first.host, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_forward_events_translates_up_and_down() {
        let (event_tx, event_rx) = flume::unbounded();
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let info = ServiceInfo::new(
            TYPE,
            "backend-service-nas-8080",
            "nas.local.",
            "10.0.0.5",
            8080,
            HashMap::<String, String>::new(),
        )
        .unwrap();

        event_tx.send(ServiceEvent::SearchStarted(TYPE.to_string())).unwrap();
        event_tx.send(ServiceEvent::ServiceResolved(info)).unwrap();
        event_tx
            .send(ServiceEvent::ServiceRemoved(
                TYPE.to_string(),
                format!("backend-service-nas-8080.{}", TYPE),
            ))
            .unwrap();
        drop(event_tx);

        forward_events(event_rx, None, TYPE, tx, cancel).await.unwrap();

        match rx.recv().await {
            Some(DiscoveryEvent::Up(record)) => {
                assert_eq!(record.name, "backend-service-nas-8080");
                assert_eq!(record.reply_address, "10.0.0.5");
                assert_eq!(record.port, 8080);
            }
            other => panic!("expected up event, got {:?}", other),
        }
        assert_eq!(
            rx.recv().await,
            Some(DiscoveryEvent::Down("backend-service-nas-8080".to_string()))
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_daemon_errors_do_not_stop_discovery() {
        let (event_tx, event_rx) = flume::unbounded();
        let (monitor_tx, monitor_rx) = flume::unbounded();
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let browser = tokio::spawn(async move {
            forward_events(event_rx, Some(monitor_rx), TYPE, tx, cancel).await
        });

        monitor_tx
            .send(DaemonEvent::Error(mdns_sd::Error::Msg("socket error".to_string())))
            .unwrap();
        drop(monitor_tx);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let info = ServiceInfo::new(
            TYPE,
            "backend-service-nas-8080",
            "nas.local.",
            "10.0.0.5",
            8080,
            HashMap::<String, String>::new(),
        )
        .unwrap();
        event_tx.send(ServiceEvent::ServiceResolved(info)).unwrap();

        match rx.recv().await {
            Some(DiscoveryEvent::Up(record)) => assert_eq!(record.name, "backend-service-nas-8080"),
            other => panic!("expected up event, got {:?}", other),
        }
        assert!(!browser.is_finished(), "Browser stopped after daemon error");

        drop(event_tx);
        browser.await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_forward_events_stops_on_cancel() {
        let (_event_tx, event_rx) = flume::unbounded::<ServiceEvent>();
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        forward_events(event_rx, None, TYPE, tx, cancel).await.unwrap();
    }
}
