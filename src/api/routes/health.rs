//! Health check endpoint

use axum::{Json, extract::State};
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub servers_count: usize,
    pub poll_interval: u64,
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        servers_count: state.poller.endpoint_count().await,
        poll_interval: state.poll_interval_secs,
    })
}
