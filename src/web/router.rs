//! Router configuration for the chat gateway.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::ws::{direct_ws_handler, room_ws_handler, ChatWsState};

/// Create the chat WebSocket router.
pub fn create_router(state: Arc<ChatWsState>) -> Router {
    Router::new()
        .route("/ws/chat/:room_name/", get(room_ws_handler))
        .route("/ws/direct_messages/:receiver/", get(direct_ws_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

/// Create the full application router.
pub fn create_app(state: Arc<ChatWsState>) -> Router {
    create_router(state).merge(create_health_router())
}
