use std::sync::Arc;
use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use shared::protocol::HELLO_WORLD_PATH;
use shared::types::HelloResponse;

#[derive(Clone)]
pub struct AppState {
    /// Advertised instance name, echoed as `source`
    pub instance_name: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HELLO_WORLD_PATH, get(hello_world))
        .with_state(state)
}

async fn hello_world(State(state): State<AppState>) -> Json<HelloResponse> {
    tracing::info!("Received request at {}", HELLO_WORLD_PATH);
    Json(HelloResponse {
        message: "Hello from the Backend!".to_string(),
        timestamp: Utc::now(),
        source: state.instance_name.to_string(),
    })
}
