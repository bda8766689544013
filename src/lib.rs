pub mod api;
pub mod config;
pub mod orchestrator;
pub mod poller;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health classification for a monitored endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Online,
    Offline,
    Error,
}

/// Lifecycle state of a channel, as reported by the remote unit.
///
/// Remote units may report states we do not know about; those degrade to
/// `Idle` rather than failing the whole status parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Running,
    Stopping,
    #[default]
    #[serde(other)]
    Idle,
}

/// One channel element of the remote `/status` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    #[serde(default)]
    pub state: ChannelState,
    #[serde(default)]
    pub status: String,
}

/// Wire format of the remote `/status` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    /// Per-core CPU utilization, in percent.
    #[serde(default)]
    pub cpu: Vec<u32>,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

/// A channel hosted on an endpoint, with a position-derived 1-based id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: u32,
    pub state: ChannelState,
    /// Free-text status description, e.g. "12:34:56 30fps@1234Kbps".
    pub status: String,
}

impl ChannelInfo {
    pub fn name(&self) -> String {
        format!("Channel {}", self.id)
    }
}

/// Outcome of one status fetch, classified once and consumed uniformly
/// by the cache writer.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Remote responded with a parseable status body.
    Online(StatusPayload),
    /// Transport-level failure (refused connection, timeout, ...).
    Unreachable(String),
    /// Remote answered, but not usefully (HTTP error, malformed body).
    ProtocolError(String),
}

/// Last-known status of a monitored endpoint.
///
/// Every fetch replaces the entry wholesale; there are no partial updates.
/// Failed fetches overwrite the previous reading with a zeroed payload and
/// a fresh timestamp, so consumers always see the most recent observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub endpoint_id: String,
    pub health: Health,
    /// Per-core CPU utilization; empty when the endpoint was not reachable.
    pub cpu_cores: Vec<u32>,
    /// Mean of `cpu_cores`, absent when the core list is empty.
    pub cpu_avg: Option<f64>,
    pub channels: Vec<ChannelInfo>,
    pub observed_at: DateTime<Utc>,
    pub message: Option<String>,
}

impl EndpointStatus {
    /// Build a full status record from a classified fetch outcome.
    pub fn from_outcome(endpoint_id: String, outcome: FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Online(payload) => {
                let channels = payload
                    .channels
                    .into_iter()
                    .enumerate()
                    .map(|(idx, entry)| ChannelInfo {
                        id: idx as u32 + 1,
                        state: entry.state,
                        status: entry.status,
                    })
                    .collect();

                Self {
                    endpoint_id,
                    health: Health::Online,
                    cpu_avg: cpu_average(&payload.cpu),
                    cpu_cores: payload.cpu,
                    channels,
                    observed_at: Utc::now(),
                    message: None,
                }
            }
            FetchOutcome::Unreachable(message) => {
                Self::failed(endpoint_id, Health::Offline, message)
            }
            FetchOutcome::ProtocolError(message) => {
                Self::failed(endpoint_id, Health::Error, message)
            }
        }
    }

    fn failed(endpoint_id: String, health: Health, message: String) -> Self {
        Self {
            endpoint_id,
            health,
            cpu_cores: Vec::new(),
            cpu_avg: None,
            channels: Vec::new(),
            observed_at: Utc::now(),
            message: Some(message),
        }
    }
}

/// Arithmetic mean of per-core CPU readings.
///
/// Returns `None` for an empty slice instead of dividing by zero.
pub fn cpu_average(cores: &[u32]) -> Option<f64> {
    if cores.is_empty() {
        return None;
    }
    let sum: u64 = cores.iter().map(|&c| u64::from(c)).sum();
    Some(sum as f64 / cores.len() as f64)
}
