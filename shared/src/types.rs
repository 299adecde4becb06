use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// A backend instance currently known to the broker.
/// Serialized as-is by the `/devices` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    /// Instance label, e.g. "backend-service-nas-8080". Routing key.
    pub name: String,

    /// First advertised IPv4 literal, else the advertised hostname
    pub host: String,

    /// Address the discovery answer came from
    pub reply_address: String,

    /// Service port
    pub port: u16,

    /// Full DNS-SD instance name, kept for diagnostics
    pub fqdn: String,

    /// First time this instance was seen
    pub discovered_at: DateTime<Utc>,
}

/// Payload of the backend's hello-world call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}
