use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::gateway::Gateway;

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .with_state(gateway)
}

/// The body is taken raw so JSON errors map onto our own envelope.
async fn chat(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Response {
    match gateway.relay(&body).await {
        Ok(stream) => stream.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}
