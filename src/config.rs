use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::trace;

/// Identity and address of a monitored media-server unit.
///
/// Descriptors come from the configuration file, are immutable once
/// constructed and are replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EndpointDescriptor {
    pub id: String,
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_endpoint_port")]
    pub port: u16,
}

impl EndpointDescriptor {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn status_url(&self) -> String {
        format!("{}/status", self.base_url())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

fn default_endpoint_port() -> u16 {
    9527
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub servers: Option<Vec<EndpointDescriptor>>,

    #[serde(default)]
    pub poll: PollSettings,

    #[serde(default)]
    pub channel: ChannelSettings,

    #[serde(default)]
    pub api: ApiSettings,
}

/// Settings for the status polling cycle.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PollSettings {
    /// Seconds between full fetch cycles.
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: f64,

    /// Upper bound on simultaneous in-flight status requests.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Hard cap on the monitored endpoint count; longer lists are
    /// prefix-truncated on load and reload.
    #[serde(default = "default_max_endpoints")]
    pub max_endpoints: usize,
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            timeout_secs: default_poll_timeout(),
            max_concurrent: default_max_concurrent(),
            max_endpoints: default_max_endpoints(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_poll_timeout() -> f64 {
    5.0
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_endpoints() -> usize {
    100
}

/// Settings for remote channel control operations.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChannelSettings {
    #[serde(default = "default_channel_timeout")]
    pub stop_timeout_secs: f64,

    #[serde(default = "default_channel_timeout")]
    pub start_timeout_secs: f64,

    /// Settle delay between the stop and start phases of a restart.
    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: f64,
}

impl ChannelSettings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.stop_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.start_timeout_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs_f64(self.restart_delay_secs)
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            stop_timeout_secs: default_channel_timeout(),
            start_timeout_secs: default_channel_timeout(),
            restart_delay_secs: default_restart_delay(),
        }
    }
}

fn default_channel_timeout() -> f64 {
    30.0
}

fn default_restart_delay() -> f64 {
    2.0
}

/// Settings for the inbound HTTP API.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// When set, requests must carry this key in the `X-API-Key` header.
    pub api_key: Option<String>,

    /// Directory with the static frontend, served at `/` when it exists.
    pub static_dir: Option<PathBuf>,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_key: None,
            static_dir: None,
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().expect("valid default bind addr")
}

fn default_enable_cors() -> bool {
    true
}

pub fn read_config_file(path: &Path) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file {}: {e}", path.display()))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
