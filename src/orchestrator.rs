//! Remote channel lifecycle control
//!
//! Issues stop/start requests against an endpoint's control surface and
//! composes the stop-then-start restart sequence. Failures are returned as
//! outcome values, never as errors: the caller always gets a result it can
//! report, including both phases of a restart.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::{ChannelSettings, EndpointDescriptor};

/// Result of a single stop or start request.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub ok: bool,
    /// Remote response body, or a classified error description.
    pub message: String,
}

/// Composite result of a restart; both phases are always visible.
#[derive(Debug, Clone, Serialize)]
pub struct RestartOutcome {
    pub stop: ActionOutcome,
    pub start: ActionOutcome,
}

impl RestartOutcome {
    pub fn ok(&self) -> bool {
        self.stop.ok && self.start.ok
    }
}

/// Executes start/stop/restart against a remote endpoint's channels.
///
/// Independent of the polling cycle; the caller is expected to trigger a
/// targeted refresh afterwards to reconcile the cached status.
pub struct ChannelOrchestrator {
    /// HTTP client (reused across requests; timeouts are set per request)
    client: reqwest::Client,

    settings: ChannelSettings,
}

impl ChannelOrchestrator {
    pub fn new(settings: ChannelSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    /// Stop one channel. `ok` is true iff the remote answered HTTP 200.
    pub async fn stop_channel(
        &self,
        endpoint: &EndpointDescriptor,
        channel_id: u32,
    ) -> ActionOutcome {
        self.channel_action(endpoint, channel_id, "stop", self.settings.stop_timeout())
            .await
    }

    /// Start one channel. `ok` is true iff the remote answered HTTP 200.
    pub async fn start_channel(
        &self,
        endpoint: &EndpointDescriptor,
        channel_id: u32,
    ) -> ActionOutcome {
        self.channel_action(endpoint, channel_id, "start", self.settings.start_timeout())
            .await
    }

    /// Restart one channel: stop, wait the settle delay, start.
    ///
    /// The start phase runs even when the stop phase failed; the goal is a
    /// running channel, not a clean transcript. Both outcomes are returned.
    #[instrument(skip_all, fields(endpoint = %endpoint.id, channel = channel_id))]
    pub async fn restart_channel(
        &self,
        endpoint: &EndpointDescriptor,
        channel_id: u32,
    ) -> RestartOutcome {
        let stop = self.stop_channel(endpoint, channel_id).await;

        tokio::time::sleep(self.settings.restart_delay()).await;

        let start = self.start_channel(endpoint, channel_id).await;

        RestartOutcome { stop, start }
    }

    /// Issue `GET {base}/channel{id}?{verb}` with the given timeout.
    ///
    /// The channel id is caller-validated; it is interpolated as-is.
    #[instrument(skip_all, fields(endpoint = %endpoint.id, channel = channel_id, verb = verb))]
    async fn channel_action(
        &self,
        endpoint: &EndpointDescriptor,
        channel_id: u32,
        verb: &str,
        timeout: Duration,
    ) -> ActionOutcome {
        let url = format!("{}/channel{}?{}", endpoint.base_url(), channel_id, verb);
        info!("executing {verb} on channel {channel_id}: {url}");

        let response = match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                let message = classify_transport_error(&e);
                warn!("channel {verb} failed: {message}");
                return ActionOutcome { ok: false, message };
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("channel {verb} failed reading response body: {e}");
                return ActionOutcome {
                    ok: false,
                    message: format!("failed to read response body: {e}"),
                };
            }
        };

        // Success is indicated purely by HTTP 200
        if status == reqwest::StatusCode::OK {
            ActionOutcome {
                ok: true,
                message: body,
            }
        } else {
            warn!("channel {verb} rejected with HTTP {status}");
            ActionOutcome {
                ok: false,
                message: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                },
            }
        }
    }
}

fn classify_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection error: {e}")
    } else {
        format!("request error: {e}")
    }
}
