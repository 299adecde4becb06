use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use shared::types::ServiceRecord;

/// Shared map of currently reachable backends, keyed by instance name.
///
/// Writes replace whole records under the write lock, so readers only ever
/// see a record before or after an update. `BTreeMap` keeps snapshots in
/// name order.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<BTreeMap<String, ServiceRecord>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `record.name`. An existing entry keeps
    /// its `discovered_at`. Returns true if the name was not known before.
    pub async fn upsert(&self, mut record: ServiceRecord) -> bool {
        let mut services = self.inner.write().await;
        match services.get(&record.name) {
            Some(existing) => {
                record.discovered_at = existing.discovered_at;
                services.insert(record.name.clone(), record);
                false
            }
            None => {
                services.insert(record.name.clone(), record);
                true
            }
        }
    }

    /// Remove a record. Returns the removed record, if any.
    pub async fn remove(&self, name: &str) -> Option<ServiceRecord> {
        self.inner.write().await.remove(name)
    }

    pub async fn get(&self, name: &str) -> Option<ServiceRecord> {
        self.inner.read().await.get(name).cloned()
    }

    /// All current records in name order
    pub async fn snapshot(&self) -> Vec<ServiceRecord> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
