use axum::{
    extract::{Path, Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use shared::protocol::{DEVICES_PATH, PROXY_PREFIX};
use shared::types::ServiceRecord;
use crate::proxy::{self, Dispatcher, ProxyError};
use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub dispatcher: Dispatcher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(DEVICES_PATH, get(get_devices))
        .route(&format!("{}/*path", PROXY_PREFIX), any(proxy_request))
        .fallback(not_found)
        .with_state(state)
}

/// "/proxy" and "/proxy/" name no service but still answer in JSON
async fn not_found(uri: Uri) -> Response {
    let path = uri.path();
    if path == PROXY_PREFIX || path.starts_with(&format!("{}/", PROXY_PREFIX)) {
        ProxyError::ServiceNotFound(String::new()).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn get_devices(State(state): State<AppState>) -> Json<Vec<ServiceRecord>> {
    tracing::info!("Request received for {}", DEVICES_PATH);
    Json(state.registry.snapshot().await)
}

/// `ANY /proxy/<service>/<rest>`. The registry answer at lookup time is final:
/// a service that just went down is a 404 even if it was up a moment ago.
async fn proxy_request(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, ProxyError> {
    // An empty first segment ("/proxy//S") names no service
    if proxy::service_segment(request.uri().path()).is_empty() {
        return Err(ProxyError::ServiceNotFound(String::new()));
    }
    // Decoded form of that segment
    let service = path.strip_prefix('/').unwrap_or(&path).split('/').next().unwrap_or_default();
    tracing::info!("Proxy request for service: {}", service);

    let record = state.registry.get(service).await.ok_or_else(|| {
        tracing::warn!("Target service {:?} not found in discovered list", service);
        ProxyError::ServiceNotFound(service.to_string())
    })?;

    state.dispatcher.dispatch(&record, request).await
}
