//! Health check endpoint.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::state::AppState;

use super::types::HealthResponse;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mode = if state.directory.is_live() {
        "live"
    } else {
        "static"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        mode: mode.to_string(),
        cache: state.directory.cache_state().as_str().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime().as_secs(),
    })
}
