//! Axum Router Configuration
//!
//! The service surface is deliberately small: the WebSocket relay endpoint
//! and a liveness probe.

use crate::{state::AppState, ws::ws_handler};

use axum::{Json, Router, routing::get};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
