use tokio::sync::mpsc;
use crate::registry::Registry;
pub use crate::mdns::browser::DiscoveryEvent;

/// Single writer for the registry. Applies discovery events in arrival order
/// and clears the registry once the browser hangs up.
pub async fn run(registry: Registry, mut rx: mpsc::Receiver<DiscoveryEvent>) {
    while let Some(event) = rx.recv().await {
        apply(&registry, event).await;
    }

    if !registry.is_empty().await {
        registry.clear().await;
        tracing::info!("Discovery ended, registry cleared");
    }
}

async fn apply(registry: &Registry, event: DiscoveryEvent) {
    match event {
        DiscoveryEvent::Up(record) => {
            let name = record.name.clone();
            let target = format!("{}:{}", record.reply_address, record.port);
            if registry.upsert(record).await {
                tracing::info!(
                    "Discovered service: {} at {} ({} known)",
                    name,
                    target,
                    registry.len().await
                );
            } else {
                tracing::debug!("Updated service: {} at {}", name, target);
            }
        }
        DiscoveryEvent::Down(name) => {
            if registry.remove(&name).await.is_some() {
                tracing::info!("Service went down: {}", name);
            } else {
                tracing::debug!("Down event for unknown service: {}", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::types::ServiceRecord;

    fn test_record(name: &str) -> ServiceRecord {
        ServiceRecord {
            name: name.to_string(),
            host: "10.0.0.5".to_string(),
            reply_address: "10.0.0.5".to_string(),
            port: 9090,
            fqdn: format!("{}._my-cool-app._tcp.local.", name),
            discovered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_applies_events_in_order() {
        let registry = Registry::new();
        let (tx, rx) = mpsc::channel(16);
        let manager = tokio::spawn(run(registry.clone(), rx));

        tx.send(DiscoveryEvent::Up(test_record("alpha"))).await.unwrap();
        tx.send(DiscoveryEvent::Up(test_record("beta"))).await.unwrap();
        tx.send(DiscoveryEvent::Down("alpha".to_string())).await.unwrap();
        tx.send(DiscoveryEvent::Down("ghost".to_string())).await.unwrap();

        // Wait until the manager has drained what we sent
        for _ in 0..100 {
            if registry.get("alpha").await.is_none() && registry.get("beta").await.is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(registry.get("alpha").await.is_none());
        assert!(registry.get("beta").await.is_some());

        drop(tx);
        manager.await.unwrap();
    }

    #[tokio::test]
    async fn test_clears_registry_when_discovery_ends() {
        let registry = Registry::new();
        let (tx, rx) = mpsc::channel(16);

        tx.send(DiscoveryEvent::Up(test_record("alpha"))).await.unwrap();
        drop(tx);

        run(registry.clone(), rx).await;
        assert!(registry.is_empty().await);
    }
}
