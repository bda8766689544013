//! Endpoint status and channel control routes
//!
//! Thin passthrough over the poller and the orchestrator. Channel action
//! responses are HTTP 200 even on `ok = false`: partial failure is data the
//! caller inspects, not a transport error.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::api::{error::ApiError, error::ApiResult, state::AppState};
use crate::config::{EndpointDescriptor, read_config_file};
use crate::orchestrator::{ActionOutcome, RestartOutcome};
use crate::{EndpointStatus, poller};

/// One endpoint with its cached status, as exposed over the API
#[derive(Debug, Serialize)]
pub struct EndpointView {
    pub config: EndpointDescriptor,
    pub status: Option<EndpointStatus>,
}

/// GET /api/servers
pub async fn list_endpoints(State(state): State<AppState>) -> Json<Value> {
    let servers: Vec<EndpointView> = state
        .poller
        .snapshot()
        .await
        .into_iter()
        .map(|(config, status)| EndpointView { config, status })
        .collect();

    Json(json!({
        "servers": servers,
        "count": servers.len(),
    }))
}

/// GET /api/servers/:id
pub async fn get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EndpointView>> {
    let config = lookup_endpoint(&state, &id).await?;
    let status = state.poller.status(&id).await;

    Ok(Json(EndpointView { config, status }))
}

/// POST /api/servers/:id/refresh
pub async fn refresh_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EndpointView>> {
    let config = lookup_endpoint(&state, &id).await?;
    let status = state.poller.refresh_one(&id).await?;

    Ok(Json(EndpointView {
        config,
        status: Some(status),
    }))
}

/// POST /api/servers/reload
///
/// Re-reads the config file and swaps the poller's endpoint set.
pub async fn reload_endpoints(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let config = read_config_file(&state.config_path)?;
    state
        .poller
        .reload(config.servers.unwrap_or_default())
        .await;

    let count = state.poller.endpoint_count().await;
    Ok(Json(json!({
        "message": "Configuration reloaded",
        "count": count,
    })))
}

/// POST /api/servers/:id/channels/:channel/stop
pub async fn stop_channel(
    State(state): State<AppState>,
    Path((id, channel)): Path<(String, u32)>,
) -> ApiResult<Json<ActionOutcome>> {
    let endpoint = lookup_endpoint(&state, &id).await?;
    validate_channel_id(channel)?;

    let outcome = state.orchestrator.stop_channel(&endpoint, channel).await;
    reconcile(&state.poller, &id).await;

    Ok(Json(outcome))
}

/// POST /api/servers/:id/channels/:channel/start
pub async fn start_channel(
    State(state): State<AppState>,
    Path((id, channel)): Path<(String, u32)>,
) -> ApiResult<Json<ActionOutcome>> {
    let endpoint = lookup_endpoint(&state, &id).await?;
    validate_channel_id(channel)?;

    let outcome = state.orchestrator.start_channel(&endpoint, channel).await;
    reconcile(&state.poller, &id).await;

    Ok(Json(outcome))
}

/// POST /api/servers/:id/channels/:channel/restart
pub async fn restart_channel(
    State(state): State<AppState>,
    Path((id, channel)): Path<(String, u32)>,
) -> ApiResult<Json<RestartOutcome>> {
    let endpoint = lookup_endpoint(&state, &id).await?;
    validate_channel_id(channel)?;

    let outcome = state.orchestrator.restart_channel(&endpoint, channel).await;
    reconcile(&state.poller, &id).await;

    Ok(Json(outcome))
}

async fn lookup_endpoint(state: &AppState, id: &str) -> ApiResult<EndpointDescriptor> {
    state
        .poller
        .endpoint(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("endpoint not found: {id}")))
}

fn validate_channel_id(channel: u32) -> ApiResult<()> {
    if channel == 0 {
        return Err(ApiError::InvalidRequest(
            "channel ids are 1-based".to_string(),
        ));
    }
    Ok(())
}

/// Best-effort cache reconciliation after a channel action.
async fn reconcile(poller: &poller::Poller, id: &str) {
    if let Err(e) = poller.refresh_one(id).await {
        tracing::debug!("post-action refresh skipped: {e}");
    }
}
