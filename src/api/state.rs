//! API shared state containing the core services
//!
//! The poller and orchestrator are constructed once at startup and injected
//! here; handlers never reach for globals.

use std::path::PathBuf;
use std::sync::Arc;

use crate::orchestrator::ChannelOrchestrator;
use crate::poller::Poller;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct AppState {
    /// Status poller owning the endpoint set and the status cache
    pub poller: Arc<Poller>,

    /// Channel lifecycle orchestrator
    pub orchestrator: Arc<ChannelOrchestrator>,

    /// Config file to re-read on reload requests
    pub config_path: Arc<PathBuf>,

    /// Poll interval in seconds, reported by the health endpoint
    pub poll_interval_secs: u64,
}

impl AppState {
    pub fn new(
        poller: Arc<Poller>,
        orchestrator: Arc<ChannelOrchestrator>,
        config_path: PathBuf,
        poll_interval_secs: u64,
    ) -> Self {
        Self {
            poller,
            orchestrator,
            config_path: Arc::new(config_path),
            poll_interval_secs,
        }
    }
}
