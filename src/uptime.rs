use crate::error::{IronDashError, Result};
use crate::server::AppState;
use crate::store::DocumentStore;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Upper bound for a single probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between process start and the first cycle, so the store can settle
pub const STARTUP_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UptimeStatus {
    Up,
    Down,
}

/// Result of one complete monitor cycle, keyed by link id
pub type Snapshot = HashMap<String, UptimeStatus>;

/// Background reachability monitor for every link on the dashboard
///
/// Each cycle probes all eligible links concurrently and then replaces the
/// published snapshot in one step, so readers always see the last complete
/// cycle. The next cycle is scheduled from the document's current
/// `pingInterval`, which means changes made through the API apply without a
/// restart.
pub struct HealthMonitor {
    store: Arc<DocumentStore>,
    client: reqwest::Client,
    startup_delay: Duration,
    snapshot: RwLock<Arc<Snapshot>>,
    updates: broadcast::Sender<Arc<Snapshot>>,
}

impl HealthMonitor {
    /// Create a monitor with the default probe timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe HTTP client cannot be built.
    pub fn new(store: Arc<DocumentStore>) -> Result<Self> {
        Self::with_timeout(store, PROBE_TIMEOUT)
    }

    /// Create a monitor whose probes give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe HTTP client cannot be built.
    pub fn with_timeout(store: Arc<DocumentStore>, timeout: Duration) -> Result<Self> {
        // Homelab services commonly use self-signed certificates. This client
        // is only used for probes, never for fetching content.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|e| IronDashError::Generic(format!("Failed to build probe client: {e}")))?;
        let (updates, _) = broadcast::channel(16);

        Ok(Self {
            store,
            client,
            startup_delay: STARTUP_DELAY,
            snapshot: RwLock::new(Arc::new(Snapshot::new())),
            updates,
        })
    }

    #[must_use]
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Status of every probed link as of the last completed cycle
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.current().as_ref().clone()
    }

    fn current(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(e) => {
                error!("Failed to acquire snapshot read lock: {e}");
                Arc::new(Snapshot::new())
            }
        }
    }

    /// Receive every snapshot published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.updates.subscribe()
    }

    /// Probe every eligible link once and publish the results.
    pub async fn run_cycle(&self) -> Arc<Snapshot> {
        let doc = self.store.load();
        let targets: Vec<(String, String)> = doc
            .links()
            .filter(|link| link.ping)
            .map(|link| (link.id.clone(), link.probe_target().to_string()))
            .collect();
        debug!("Starting health check cycle for {} links", targets.len());

        let mut tasks = Vec::with_capacity(targets.len());
        for (link_id, url) in targets {
            let client = self.client.clone();
            tasks.push(tokio::spawn(async move {
                let status = check_link_status(&client, &url).await;
                (link_id, status)
            }));
        }

        let mut snapshot = Snapshot::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok((link_id, status)) => {
                    snapshot.insert(link_id, status);
                }
                Err(e) => error!("Health check task failed: {e}"),
            }
        }

        let snapshot = Arc::new(snapshot);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot.clone(),
            Err(e) => error!("Failed to acquire snapshot write lock: {e}"),
        }
        // No subscribers is fine.
        let _ = self.updates.send(snapshot.clone());

        let down = snapshot.values().filter(|s| **s == UptimeStatus::Down).count();
        info!(
            "Health check cycle complete: {} up, {down} down",
            snapshot.len() - down
        );
        snapshot
    }

    /// Run cycles until cancelled or until the ping interval is disabled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Starting health monitor");
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(self.startup_delay) => {}
        }

        loop {
            self.run_cycle().await;

            let interval = self.store.load().ping_interval;
            if interval <= 0 {
                info!("Ping interval is {interval}; health monitor is now dormant");
                return;
            }
            debug!("Next health check in {interval}s");

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Health monitor stopped");
                    return;
                }
                () = tokio::time::sleep(Duration::from_secs(interval.unsigned_abs())) => {}
            }
        }
    }
}

/// Classify a single link. Never fails: every error means `Down`.
async fn check_link_status(client: &reqwest::Client, url: &str) -> UptimeStatus {
    if let Err(e) = url::Url::parse(url) {
        debug!("Link {url} is DOWN: malformed URL ({e})");
        return UptimeStatus::Down;
    }

    match client.head(url).send().await {
        Ok(response) => {
            let status = response.status();
            if status.as_u16() < 500 {
                debug!("Link {url} is UP: status {status}");
                UptimeStatus::Up
            } else {
                debug!("Link {url} is DOWN: status {status}");
                UptimeStatus::Down
            }
        }
        Err(e) => {
            debug!("Link {url} is DOWN: error {e}");
            UptimeStatus::Down
        }
    }
}

/// `GET /api/status`
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.monitor.snapshot())
}

/// `GET /api/status/stream`: the current snapshot, then one event per cycle
pub async fn status_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let initial = state.monitor.current();
    let updates = BroadcastStream::new(state.monitor.subscribe()).filter_map(|msg| msg.ok());

    let stream = tokio_stream::once(initial).chain(updates).map(|snapshot| {
        match Event::default().event("status").json_data(&*snapshot) {
            Ok(event) => Ok(event),
            Err(e) => {
                error!("Failed to serialize status snapshot for SSE: {e}");
                Ok(Event::default().data("Error"))
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Group, Link};
    use axum::{http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;
    use tempfile::{tempdir, TempDir};

    const TEST_TIMEOUT: Duration = Duration::from_secs(1);

    async fn spawn_http_server() -> SocketAddr {
        let app = Router::new()
            .route("/ok", get(|| async { StatusCode::OK }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to get local address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        addr
    }

    /// Accepts connections and never answers.
    async fn spawn_silent_server() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind silent server");
        let addr = listener.local_addr().expect("Failed to get local address");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        addr
    }

    fn closed_port() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        listener.local_addr().expect("Failed to get local address")
    }

    fn link(id: &str, url: &str) -> Link {
        Link {
            id: id.to_string(),
            name: id.to_string(),
            url: url.to_string(),
            ..Link::default()
        }
    }

    fn monitor_with(links: Vec<Link>) -> (TempDir, Arc<DocumentStore>, HealthMonitor) {
        let dir = tempdir().expect("Failed to create temporary directory");
        let store = Arc::new(DocumentStore::new(dir.path().join("dashboard.json")));
        let doc = Document {
            groups: vec![Group {
                id: "g1".to_string(),
                name: "Lab".to_string(),
                links,
                ..Group::default()
            }],
            ..Document::default()
        };
        store.save(&doc).expect("Failed to save test document");
        let monitor = HealthMonitor::with_timeout(store.clone(), TEST_TIMEOUT)
            .expect("Failed to build monitor")
            .with_startup_delay(Duration::ZERO);
        (dir, store, monitor)
    }

    fn probe_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(TEST_TIMEOUT)
            .build()
            .expect("Failed to build client")
    }

    #[tokio::test]
    async fn test_probe_success_is_up() {
        let addr = spawn_http_server().await;
        let status = check_link_status(&probe_client(), &format!("http://{addr}/ok")).await;
        assert_eq!(status, UptimeStatus::Up);
    }

    #[tokio::test]
    async fn test_probe_client_error_is_still_up() {
        let addr = spawn_http_server().await;
        let status = check_link_status(&probe_client(), &format!("http://{addr}/missing")).await;
        assert_eq!(status, UptimeStatus::Up);
    }

    #[tokio::test]
    async fn test_probe_server_error_is_down() {
        let addr = spawn_http_server().await;
        let status = check_link_status(&probe_client(), &format!("http://{addr}/down")).await;
        assert_eq!(status, UptimeStatus::Down);
    }

    #[tokio::test]
    async fn test_probe_refused_is_down() {
        let addr = closed_port();
        let status = check_link_status(&probe_client(), &format!("http://{addr}/")).await;
        assert_eq!(status, UptimeStatus::Down);
    }

    #[tokio::test]
    async fn test_probe_timeout_is_down() {
        let addr = spawn_silent_server().await;
        let status = check_link_status(&probe_client(), &format!("http://{addr}/")).await;
        assert_eq!(status, UptimeStatus::Down);
    }

    #[tokio::test]
    async fn test_probe_malformed_url_is_down() {
        assert_eq!(
            check_link_status(&probe_client(), "not a url").await,
            UptimeStatus::Down
        );
        assert_eq!(check_link_status(&probe_client(), "").await, UptimeStatus::Down);
    }

    #[tokio::test]
    async fn test_cycle_probes_concurrently() {
        let http = spawn_http_server().await;
        let silent = spawn_silent_server().await;

        let mut links: Vec<Link> = (0..6)
            .map(|i| link(&format!("hang{i}"), &format!("http://{silent}/")))
            .collect();
        links.push(link("ok", &format!("http://{http}/ok")));
        let (_dir, _store, monitor) = monitor_with(links);

        let started = std::time::Instant::now();
        let snapshot = monitor.run_cycle().await;
        let elapsed = started.elapsed();

        assert!(
            elapsed < TEST_TIMEOUT * 3,
            "cycle took {elapsed:?}; probes appear to run serially"
        );
        assert_eq!(snapshot.len(), 7);
        assert_eq!(snapshot.get("ok"), Some(&UptimeStatus::Up));
        assert!((0..6).all(|i| snapshot.get(&format!("hang{i}")) == Some(&UptimeStatus::Down)));
    }

    #[tokio::test]
    async fn test_cycle_uses_ping_url_and_skips_opted_out_links() {
        let http = spawn_http_server().await;
        let mut via_override = link("override", "http://unreachable.invalid/");
        via_override.ping_url = Some(format!("http://{http}/ok"));
        let mut muted = link("muted", &format!("http://{http}/down"));
        muted.ping = false;

        let (_dir, _store, monitor) = monitor_with(vec![via_override, muted]);
        let snapshot = monitor.run_cycle().await;

        assert_eq!(snapshot.get("override"), Some(&UptimeStatus::Up));
        assert!(!snapshot.contains_key("muted"));
        assert_eq!(monitor.snapshot(), *snapshot);
    }

    #[tokio::test]
    async fn test_opting_out_removes_previous_entry() {
        let http = spawn_http_server().await;
        let (_dir, store, monitor) = monitor_with(vec![link("nas", &format!("http://{http}/ok"))]);

        monitor.run_cycle().await;
        assert_eq!(monitor.snapshot().get("nas"), Some(&UptimeStatus::Up));

        store
            .update(|doc| doc.update_link("nas", &serde_json::json!({ "ping": false })))
            .await
            .expect("Failed to update link");
        monitor.run_cycle().await;

        assert!(monitor.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_zero_interval_makes_monitor_dormant() {
        let (_dir, store, monitor) = monitor_with(vec![]);
        store
            .update(|doc| {
                doc.ping_interval = 0;
                Ok(())
            })
            .await
            .expect("Failed to update interval");
        let monitor = Arc::new(monitor);
        let mut updates = monitor.subscribe();

        tokio::time::timeout(Duration::from_secs(5), monitor.clone().run(CancellationToken::new()))
            .await
            .expect("monitor should stop on its own");

        assert!(updates.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting_monitor() {
        let (_dir, _store, monitor) = monitor_with(vec![]);
        let monitor = Arc::new(monitor);
        let mut updates = monitor.subscribe();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(monitor.clone().run(cancel.clone()));
        updates.recv().await.expect("first cycle completes");
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor should stop after cancel")
            .expect("monitor task panicked");
    }

    #[test]
    fn test_status_serialization() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("l1".to_string(), UptimeStatus::Up);
        snapshot.insert("l2".to_string(), UptimeStatus::Down);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json, serde_json::json!({ "l1": "up", "l2": "down" }));
    }
}
