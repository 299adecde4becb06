use std::net::Ipv6Addr;
use std::time::Duration;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
    Json,
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::json;
use shared::protocol::PROXY_PREFIX;
use shared::types::ServiceRecord;
use crate::config::{AddressPreference, ProxyConfig};

const NOT_FOUND_MESSAGE: &str = "Service not found or not discovered yet.";

/// Headers that describe the inbound connection rather than the request
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
];

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("service {0} not found")]
    ServiceNotFound(String),

    #[error("invalid target uri {uri}")]
    InvalidTarget {
        uri: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },

    #[error("failed to forward request")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

impl ProxyError {
    /// Full error chain, for the `details` field of a 502
    fn details(&self) -> String {
        let mut details = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            details.push_str(": ");
            details.push_str(&err.to_string());
            source = err.source();
        }
        details
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::ServiceNotFound(_) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": NOT_FOUND_MESSAGE })),
            )
                .into_response(),
            ProxyError::InvalidTarget { .. } | ProxyError::Upstream(_) => {
                let details = self.details();
                tracing::error!("Proxy error: {}", details);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Proxy error", "details": details })),
                )
                    .into_response()
            }
        }
    }
}

/// Forwards requests to resolved backends over one shared connection pool.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client<HttpConnector, Body>,
    preference: AddressPreference,
}

impl Dispatcher {
    pub fn new(config: &ProxyConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            preference: config.address_preference,
        }
    }

    /// Send `request` to `record` with the proxy prefix stripped, returning the
    /// backend's response with its body still streaming.
    ///
    /// An error is only returned before any response head exists. Failures
    /// while the body streams abort the client connection instead.
    pub async fn dispatch(
        &self,
        record: &ServiceRecord,
        mut request: Request,
    ) -> Result<Response, ProxyError> {
        let uri = target_uri(record, self.preference, request.uri())?;
        tracing::info!("Proxying {} {} to {}", request.method(), request.uri(), uri);

        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;
        strip_hop_by_hop(request.headers_mut());
        // The client sets Host from the target
        request.headers_mut().remove(header::HOST);

        let mut response = self.client.request(request).await?;
        strip_hop_by_hop(response.headers_mut());
        Ok(response.map(Body::new))
    }
}

/// Drop headers that only apply to a single connection
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by Connection are hop-by-hop too
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Everything after "/proxy/", or "" when the prefix is absent
fn after_prefix(path: &str) -> &str {
    path.strip_prefix(PROXY_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or("")
}

/// First segment after the prefix, still percent-encoded. Empty for
/// "/proxy/" and "/proxy//x".
pub fn service_segment(path: &str) -> &str {
    let rest = after_prefix(path);
    match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}

/// Path forwarded to the backend: "/proxy/<service>/rest" -> "/rest".
/// Never empty; "/proxy/<service>" maps to "/".
pub fn rewrite_path(path: &str) -> &str {
    let rest = after_prefix(path);
    match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "/",
    }
}

/// "host:port" for the preferred address, bracketing IPv6 literals
pub fn target_authority(record: &ServiceRecord, preference: AddressPreference) -> String {
    let address = match preference {
        AddressPreference::Origin => record.reply_address.as_str(),
        AddressPreference::Host => record.host.as_str(),
        AddressPreference::Fqdn => record.fqdn.trim_end_matches('.'),
    };

    if address.parse::<Ipv6Addr>().is_ok() {
        format!("[{}]:{}", address, record.port)
    } else {
        format!("{}:{}", address, record.port)
    }
}

fn target_uri(
    record: &ServiceRecord,
    preference: AddressPreference,
    original: &Uri,
) -> Result<Uri, ProxyError> {
    let path = rewrite_path(original.path());
    let uri = match original.query() {
        Some(query) => format!("http://{}{}?{}", target_authority(record, preference), path, query),
        None => format!("http://{}{}", target_authority(record, preference), path),
    };

    uri.parse().map_err(|source| ProxyError::InvalidTarget { uri, source })
}
