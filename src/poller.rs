//! Status poller for the monitored fleet
//!
//! One long-lived task runs the repeating fetch cycle. Each tick fans out
//! one fetch per configured endpoint; fetches acquire a permit from a
//! fixed-size semaphore before going on the wire, so at most
//! `max_concurrent` requests are in flight at any instant. Failures are
//! classified per fetch and written to the cache like any other result.
//!
//! ## Concurrency contract
//!
//! - Cache reads are snapshot reads under a read lock.
//! - Each fetch writes only its own cache entry; a `refresh_one` racing the
//!   scheduled cycle is last-writer-wins.
//! - `reload` takes the descriptor write lock and then the cache write lock
//!   (always in that order) to swap the set and purge removed entries in one
//!   step. Cache writers hold the descriptor read lock across their
//!   membership check and insert, so a fetch finishing after a reload can
//!   never resurrect an entry for a removed endpoint.
//! - `stop()` interrupts both the inter-tick sleep and a mid-flight cycle;
//!   in-flight fetches are cancelled rather than drained.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, trace, warn};

use crate::config::{EndpointDescriptor, PollSettings};
use crate::{EndpointStatus, FetchOutcome, StatusPayload};

/// Result type alias for poller operations
pub type PollerResult<T> = Result<T, PollerError>;

/// Errors surfaced synchronously to poller callers
#[derive(Debug)]
pub enum PollerError {
    /// The requested identity is not part of the configured endpoint set
    NotFound(String),
}

impl fmt::Display for PollerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollerError::NotFound(id) => write!(f, "endpoint not found: {}", id),
        }
    }
}

impl std::error::Error for PollerError {}

/// Polls all configured endpoints on a fixed interval and caches the most
/// recent status per endpoint.
///
/// Constructed once at startup and shared behind an `Arc`; the routing
/// layer gets a reference instead of reaching for a global.
pub struct Poller {
    inner: Arc<PollerInner>,

    /// Slot for the running cycle task; `Some` while started.
    running: Mutex<Option<RunningCycle>>,
}

struct RunningCycle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct PollerInner {
    settings: PollSettings,

    /// HTTP client (reused across requests, carries the per-request timeout)
    client: reqwest::Client,

    endpoints: RwLock<Vec<EndpointDescriptor>>,

    cache: RwLock<HashMap<String, EndpointStatus>>,

    /// Concurrency limiter for outbound status requests
    limiter: Semaphore,
}

impl Poller {
    pub fn new(mut endpoints: Vec<EndpointDescriptor>, settings: PollSettings) -> Self {
        truncate_to_limit(&mut endpoints, settings.max_endpoints);

        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .expect("Failed to build HTTP client");

        let limiter = Semaphore::new(settings.max_concurrent);

        Self {
            inner: Arc::new(PollerInner {
                settings,
                client,
                endpoints: RwLock::new(endpoints),
                cache: RwLock::new(HashMap::new()),
                limiter,
            }),
            running: Mutex::new(None),
        }
    }

    /// Start the repeating fetch cycle.
    ///
    /// Idempotent: calling this while already running is a no-op. The first
    /// full fetch pass runs immediately after the cycle task is spawned.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("poller already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(run_cycle_loop(inner, shutdown_rx));

        *running = Some(RunningCycle {
            shutdown: shutdown_tx,
            handle,
        });

        debug!("poller started");
    }

    /// Stop the repeating fetch cycle and await its termination.
    ///
    /// In-flight fetches are cancelled. The HTTP client and its connection
    /// pool are kept for the poller's lifetime so `start()` can resume
    /// without rebuilding them; idle pooled connections age out on their
    /// own. Safe to call when not started.
    pub async fn stop(&self) {
        let Some(cycle) = self.running.lock().await.take() else {
            debug!("poller not running, nothing to stop");
            return;
        };

        let _ = cycle.shutdown.send(true);
        if let Err(e) = cycle.handle.await {
            error!("poll cycle task failed to shut down cleanly: {e}");
        }

        debug!("poller stopped");
    }

    /// Atomically replace the endpoint set.
    ///
    /// Cache entries for identities absent from the new set are purged in
    /// the same step; entries for retained identities survive until the
    /// next fetch overwrites them. The list is truncated to the configured
    /// maximum endpoint count.
    pub async fn reload(&self, mut new_endpoints: Vec<EndpointDescriptor>) {
        truncate_to_limit(&mut new_endpoints, self.inner.settings.max_endpoints);

        let mut endpoints = self.inner.endpoints.write().await;
        let mut cache = self.inner.cache.write().await;

        cache.retain(|id, _| new_endpoints.iter().any(|e| &e.id == id));
        *endpoints = new_endpoints;

        debug!("reloaded endpoint set, now monitoring {}", endpoints.len());
    }

    /// Fetch one endpoint immediately, outside the scheduled cycle.
    ///
    /// Still acquires a limiter permit and uses the regular request timeout.
    pub async fn refresh_one(&self, id: &str) -> PollerResult<EndpointStatus> {
        let endpoint = {
            let endpoints = self.inner.endpoints.read().await;
            endpoints.iter().find(|e| e.id == id).cloned()
        }
        .ok_or_else(|| PollerError::NotFound(id.to_string()))?;

        Ok(self.inner.poll_one(&endpoint).await)
    }

    /// Cached status for one endpoint, `None` if never fetched.
    pub async fn status(&self, id: &str) -> Option<EndpointStatus> {
        self.inner.cache.read().await.get(id).cloned()
    }

    /// Descriptor for one endpoint, `None` if not configured.
    pub async fn endpoint(&self, id: &str) -> Option<EndpointDescriptor> {
        let endpoints = self.inner.endpoints.read().await;
        endpoints.iter().find(|e| e.id == id).cloned()
    }

    /// Snapshot of all configured endpoints with their cached status.
    pub async fn snapshot(&self) -> Vec<(EndpointDescriptor, Option<EndpointStatus>)> {
        let endpoints = self.inner.endpoints.read().await;
        let cache = self.inner.cache.read().await;
        endpoints
            .iter()
            .map(|e| (e.clone(), cache.get(&e.id).cloned()))
            .collect()
    }

    pub async fn endpoint_count(&self) -> usize {
        self.inner.endpoints.read().await.len()
    }
}

fn truncate_to_limit(endpoints: &mut Vec<EndpointDescriptor>, max: usize) {
    if endpoints.len() > max {
        warn!(
            "endpoint list exceeds configured maximum of {max}, dropping {} trailing entries",
            endpoints.len() - max
        );
        endpoints.truncate(max);
    }
}

/// The cycle loop: poll everything, sleep, repeat.
///
/// Both the sleep and a mid-flight cycle observe the shutdown signal, so
/// shutdown latency is bounded by a small constant rather than the poll
/// interval. Dropping the cycle future aborts its fetch tasks.
async fn run_cycle_loop(inner: Arc<PollerInner>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval(inner.settings.interval());
    // A slow cycle must not cause a burst of catch-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => {
                debug!("shutdown requested during sleep");
                break;
            }
        }

        tokio::select! {
            _ = Arc::clone(&inner).poll_all() => {}
            _ = shutdown_rx.changed() => {
                debug!("shutdown requested mid-cycle, cancelling in-flight fetches");
                break;
            }
        }
    }
}

impl PollerInner {
    /// Run one full fetch cycle across all configured endpoints.
    ///
    /// Each endpoint gets its own task; a failure or panic in one never
    /// aborts or blocks the others.
    async fn poll_all(self: Arc<Self>) {
        let endpoints = self.endpoints.read().await.clone();
        trace!("starting fetch cycle for {} endpoints", endpoints.len());

        let mut tasks = JoinSet::new();
        for endpoint in endpoints {
            let inner = Arc::clone(&self);
            tasks.spawn(async move {
                inner.poll_one(&endpoint).await;
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!("fetch task panicked: {e}");
                }
            }
        }

        trace!("fetch cycle complete");
    }

    /// Fetch one endpoint and overwrite its cache entry with the result.
    #[instrument(skip_all, fields(endpoint = %endpoint.id))]
    async fn poll_one(&self, endpoint: &EndpointDescriptor) -> EndpointStatus {
        let outcome = {
            let _permit = self
                .limiter
                .acquire()
                .await
                .expect("status fetch semaphore is never closed");

            fetch_status(&self.client, &endpoint.status_url()).await
        };

        match &outcome {
            FetchOutcome::Online(payload) => {
                trace!(
                    "{}: online, {} channels",
                    endpoint.display_name(),
                    payload.channels.len()
                );
            }
            FetchOutcome::Unreachable(msg) => {
                warn!("{}: unreachable: {msg}", endpoint.display_name());
            }
            FetchOutcome::ProtocolError(msg) => {
                warn!("{}: protocol error: {msg}", endpoint.display_name());
            }
        }

        let status = EndpointStatus::from_outcome(endpoint.id.clone(), outcome);
        self.store(status).await
    }

    /// Write a fresh status into the cache.
    ///
    /// Holds the descriptor read lock across the membership check and the
    /// insert so the write cannot interleave with a reload that removed
    /// this endpoint.
    async fn store(&self, status: EndpointStatus) -> EndpointStatus {
        let endpoints = self.endpoints.read().await;
        if !endpoints.iter().any(|e| e.id == status.endpoint_id) {
            trace!(
                "dropping fetch result for removed endpoint {}",
                status.endpoint_id
            );
            return status;
        }

        let mut cache = self.cache.write().await;
        cache.insert(status.endpoint_id.clone(), status.clone());
        status
    }
}

/// Issue one status request and classify the result.
///
/// This is the single classification point: connection-level failures map
/// to `Unreachable` (endpoint offline), while an answering endpoint that
/// returns an error status or an undecodable body maps to `ProtocolError`.
async fn fetch_status(client: &reqwest::Client, url: &str) -> FetchOutcome {
    trace!("requesting status from {url}");

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return classify_transport_error(&e),
    };

    let status = response.status();
    if !status.is_success() {
        return FetchOutcome::ProtocolError(format!("HTTP {status}"));
    }

    match response.json::<StatusPayload>().await {
        Ok(payload) => FetchOutcome::Online(payload),
        Err(e) => FetchOutcome::ProtocolError(format!("malformed status payload: {e}")),
    }
}

fn classify_transport_error(e: &reqwest::Error) -> FetchOutcome {
    if e.is_timeout() {
        FetchOutcome::Unreachable("request timed out".to_string())
    } else if e.is_connect() {
        FetchOutcome::Unreachable(format!("connection refused: {e}"))
    } else {
        FetchOutcome::Unreachable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Health;
    use assert_matches::assert_matches;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_settings() -> PollSettings {
        PollSettings {
            interval_secs: 60,
            timeout_secs: 1.0,
            max_concurrent: 10,
            max_endpoints: 100,
        }
    }

    fn descriptor(id: &str, host: &str, port: u16) -> EndpointDescriptor {
        EndpointDescriptor {
            id: id.to_string(),
            name: Some(format!("Test {id}")),
            host: host.to_string(),
            port,
        }
    }

    fn descriptor_for(id: &str, uri: &str) -> EndpointDescriptor {
        let url = url::Url::parse(uri).unwrap();
        descriptor(id, url.host_str().unwrap(), url.port().unwrap())
    }

    fn status_body(cpu: Vec<u32>) -> serde_json::Value {
        serde_json::json!({
            "cpu": cpu,
            "channels": [
                {"state": "running", "status": "12:34:56 30fps@1234Kbps"},
                {"state": "idle", "status": ""}
            ]
        })
    }

    async fn mount_status(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn successful_fetch_writes_online_status() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(status_body(vec![30, 40, 50])),
        )
        .await;

        let poller = Poller::new(
            vec![descriptor_for("e1", &mock_server.uri())],
            test_settings(),
        );

        let status = poller.refresh_one("e1").await.unwrap();

        assert_eq!(status.health, Health::Online);
        assert_eq!(status.cpu_avg, Some(40.0));
        assert_eq!(status.cpu_cores, vec![30, 40, 50]);
        assert_eq!(status.channels.len(), 2);
        assert_eq!(status.channels[0].id, 1);
        assert!(status.message.is_none());

        // Cached copy matches the returned one
        let cached = poller.status("e1").await.unwrap();
        assert_eq!(cached.health, Health::Online);
        assert_eq!(cached.cpu_avg, Some(40.0));
    }

    #[tokio::test]
    async fn http_error_status_is_classified_as_error() {
        let mock_server = MockServer::start().await;
        mount_status(&mock_server, ResponseTemplate::new(500)).await;

        let poller = Poller::new(
            vec![descriptor_for("e1", &mock_server.uri())],
            test_settings(),
        );

        let status = poller.refresh_one("e1").await.unwrap();

        assert_eq!(status.health, Health::Error);
        assert!(status.message.as_deref().unwrap().contains("HTTP 500"));
        assert!(status.channels.is_empty());
        assert_eq!(status.cpu_avg, None);
    }

    #[tokio::test]
    async fn malformed_payload_is_classified_as_error() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200).set_body_string("not valid json"),
        )
        .await;

        let poller = Poller::new(
            vec![descriptor_for("e1", &mock_server.uri())],
            test_settings(),
        );

        let status = poller.refresh_one("e1").await.unwrap();

        assert_eq!(status.health, Health::Error);
        assert!(status.message.as_deref().unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_classified_as_offline() {
        // Port 1 on loopback refuses connections
        let poller = Poller::new(vec![descriptor("e1", "127.0.0.1", 1)], test_settings());

        let status = poller.refresh_one("e1").await.unwrap();

        assert_eq!(status.health, Health::Offline);
        assert!(status.message.is_some());
        assert!(status.channels.is_empty());
    }

    #[tokio::test]
    async fn refresh_one_unknown_endpoint_returns_not_found() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(status_body(vec![10])),
        )
        .await;

        let poller = Poller::new(
            vec![descriptor_for("e1", &mock_server.uri())],
            test_settings(),
        );

        let err = poller.refresh_one("nope").await.unwrap_err();
        assert_matches!(err, PollerError::NotFound(ref id) if id == "nope");

        // Cache untouched
        assert!(poller.status("nope").await.is_none());
        assert!(poller.status("e1").await.is_none());
    }

    #[tokio::test]
    async fn reload_with_empty_list_clears_cache() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(status_body(vec![10])),
        )
        .await;

        let poller = Poller::new(
            vec![descriptor_for("e1", &mock_server.uri())],
            test_settings(),
        );
        poller.refresh_one("e1").await.unwrap();
        assert!(poller.status("e1").await.is_some());

        poller.reload(vec![]).await;

        assert!(poller.status("e1").await.is_none());
        assert!(poller.snapshot().await.is_empty());
        assert_eq!(poller.endpoint_count().await, 0);
    }

    #[tokio::test]
    async fn reload_purges_removed_and_keeps_retained_entries() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(status_body(vec![10])),
        )
        .await;

        let e1 = descriptor_for("e1", &mock_server.uri());
        let e2 = descriptor_for("e2", &mock_server.uri());
        let poller = Poller::new(vec![e1.clone(), e2], test_settings());

        poller.refresh_one("e1").await.unwrap();
        poller.refresh_one("e2").await.unwrap();

        poller.reload(vec![e1]).await;

        assert!(poller.status("e1").await.is_some());
        assert!(poller.status("e2").await.is_none());
        assert!(poller.endpoint("e2").await.is_none());
    }

    #[tokio::test]
    async fn back_to_back_reloads_leave_only_the_last_set() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(status_body(vec![10])),
        )
        .await;

        let e1 = descriptor_for("e1", &mock_server.uri());
        let e2 = descriptor_for("e2", &mock_server.uri());
        let e3 = descriptor_for("e3", &mock_server.uri());

        let poller = Poller::new(vec![e1.clone()], test_settings());
        poller.refresh_one("e1").await.unwrap();

        poller.reload(vec![e1, e2]).await;
        poller.reload(vec![e3]).await;

        let snapshot = poller.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0.id, "e3");
        assert!(poller.status("e1").await.is_none());
        assert!(poller.status("e2").await.is_none());
    }

    #[tokio::test]
    async fn construction_and_reload_truncate_to_max_endpoints() {
        let settings = PollSettings {
            max_endpoints: 1,
            ..test_settings()
        };

        let poller = Poller::new(
            vec![
                descriptor("e1", "127.0.0.1", 9001),
                descriptor("e2", "127.0.0.1", 9002),
            ],
            settings,
        );
        assert_eq!(poller.endpoint_count().await, 1);
        assert!(poller.endpoint("e1").await.is_some());
        assert!(poller.endpoint("e2").await.is_none());

        poller
            .reload(vec![
                descriptor("e3", "127.0.0.1", 9003),
                descriptor("e4", "127.0.0.1", 9004),
            ])
            .await;
        assert_eq!(poller.endpoint_count().await, 1);
        assert!(poller.endpoint("e3").await.is_some());
        assert!(poller.endpoint("e4").await.is_none());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_runs_initial_pass() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(status_body(vec![25])),
        )
        .await;

        let poller = Poller::new(
            vec![descriptor_for("e1", &mock_server.uri())],
            test_settings(),
        );

        poller.start().await;
        poller.start().await; // no-op, must not spawn a second cycle

        // The initial pass runs right after start; wait for it to land
        let deadline = Instant::now() + std::time::Duration::from_secs(3);
        loop {
            if let Some(status) = poller.status("e1").await {
                assert_eq!(status.health, Health::Online);
                break;
            }
            assert!(Instant::now() < deadline, "initial fetch pass never ran");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        poller.stop().await;
        poller.stop().await; // safe when already stopped
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let poller = Poller::new(vec![], test_settings());
        poller.stop().await;
    }

    #[tokio::test]
    async fn one_failing_endpoint_does_not_block_the_others() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(status_body(vec![50])),
        )
        .await;

        let poller = Poller::new(
            vec![
                descriptor_for("good-1", &mock_server.uri()),
                descriptor("dead", "127.0.0.1", 1),
                descriptor_for("good-2", &mock_server.uri()),
            ],
            test_settings(),
        );

        Arc::clone(&poller.inner).poll_all().await;

        assert_eq!(poller.status("good-1").await.unwrap().health, Health::Online);
        assert_eq!(poller.status("dead").await.unwrap().health, Health::Offline);
        assert_eq!(poller.status("good-2").await.unwrap().health, Health::Online);
    }

    #[tokio::test]
    async fn limiter_serializes_fetches_when_capacity_is_one() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200)
                .set_body_json(status_body(vec![10]))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .await;

        let settings = PollSettings {
            max_concurrent: 1,
            ..test_settings()
        };
        let poller = Poller::new(
            vec![
                descriptor_for("e1", &mock_server.uri()),
                descriptor_for("e2", &mock_server.uri()),
                descriptor_for("e3", &mock_server.uri()),
            ],
            settings,
        );

        let started = Instant::now();
        Arc::clone(&poller.inner).poll_all().await;
        let elapsed = started.elapsed();

        // Three 200ms responses through a single permit cannot finish faster
        // than serially
        assert!(
            elapsed >= std::time::Duration::from_millis(550),
            "cycle finished in {elapsed:?}, limiter did not serialize fetches"
        );

        for id in ["e1", "e2", "e3"] {
            assert_eq!(poller.status(id).await.unwrap().health, Health::Online);
        }
    }

    /// Responder that tracks how many requests are in flight at once.
    ///
    /// The count drops when the response delay elapses, which is when the
    /// mock server starts writing the response body.
    struct InFlightGauge {
        in_flight: Arc<std::sync::atomic::AtomicUsize>,
        high_water: Arc<std::sync::atomic::AtomicUsize>,
        delay: std::time::Duration,
    }

    impl wiremock::Respond for InFlightGauge {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            use std::sync::atomic::Ordering;

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(now, Ordering::SeqCst);

            let in_flight = Arc::clone(&self.in_flight);
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });

            ResponseTemplate::new(200)
                .set_body_json(status_body(vec![10]))
                .set_delay(delay)
        }
    }

    #[tokio::test]
    async fn limiter_caps_in_flight_requests_at_max_concurrent() {
        let in_flight = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let high_water = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(InFlightGauge {
                in_flight: Arc::clone(&in_flight),
                high_water: Arc::clone(&high_water),
                delay: std::time::Duration::from_millis(300),
            })
            .mount(&mock_server)
            .await;

        let settings = PollSettings {
            max_concurrent: 2,
            ..test_settings()
        };
        let endpoints = (1..=5)
            .map(|n| descriptor_for(&format!("e{n}"), &mock_server.uri()))
            .collect();
        let poller = Poller::new(endpoints, settings);

        Arc::clone(&poller.inner).poll_all().await;

        // Two permits means two overlapping requests, never a third
        let peak = high_water.load(std::sync::atomic::Ordering::SeqCst);
        assert_eq!(peak, 2, "peak in-flight count was {peak}");

        for n in 1..=5 {
            let id = format!("e{n}");
            assert_eq!(poller.status(&id).await.unwrap().health, Health::Online);
        }
    }

    #[tokio::test]
    async fn offline_cycles_then_recovery_transition_to_online() {
        // Bound but unserved listener: connections are accepted and then
        // time out, which classifies as offline
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let endpoint = descriptor("e1", "127.0.0.1", port);
        let settings = PollSettings {
            timeout_secs: 0.5,
            ..test_settings()
        };
        let poller = Poller::new(vec![endpoint], settings);

        let first = poller.refresh_one("e1").await.unwrap();
        assert_eq!(first.health, Health::Offline);

        let second = poller.refresh_one("e1").await.unwrap();
        assert_eq!(second.health, Health::Offline);
        assert!(second.observed_at > first.observed_at);

        // Bring the endpoint up on the same address
        let mock_server = MockServer::builder().listener(listener).start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(status_body(vec![20])),
        )
        .await;

        let third = poller.refresh_one("e1").await.unwrap();
        assert_eq!(third.health, Health::Online);
        assert!(third.observed_at > second.observed_at);
    }

    #[tokio::test]
    async fn reload_during_in_flight_fetch_keeps_removed_endpoint_absent() {
        let mock_server = MockServer::start().await;
        mount_status(
            &mock_server,
            ResponseTemplate::new(200)
                .set_body_json(status_body(vec![10]))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .await;

        let poller = Arc::new(Poller::new(
            vec![descriptor_for("a", &mock_server.uri())],
            test_settings(),
        ));

        let in_flight = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.refresh_one("a").await })
        };

        // Let the fetch get onto the wire, then remove the endpoint
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        poller.reload(vec![]).await;

        // The fetch itself completes, but its result must not re-enter the cache
        let result = in_flight.await.unwrap();
        assert!(result.is_ok());
        assert!(poller.status("a").await.is_none());
        assert!(poller.snapshot().await.is_empty());
    }
}
