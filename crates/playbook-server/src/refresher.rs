use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use playbook_core::config::AnalyticsConfig;
use playbook_core::report::{build_report, AnalyticsReport, ReportRequest};
use playbook_core::repository::RunRepository;
use playbook_core::snapshot::TelemetrySnapshot;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::AbortHandle;

use crate::source::SnapshotSource;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("no telemetry snapshot available yet")]
    NoSnapshot,

    #[error("refresh of view '{view}' (generation {generation}) was superseded")]
    Superseded { view: String, generation: u64 },

    #[error("refresh task failed: {0}")]
    Task(String),
}

/// A fetched snapshot and the repository built from it. Never mutated.
#[derive(Debug)]
pub struct CachedSnapshot {
    pub snapshot: TelemetrySnapshot,
    pub repository: RunRepository,
}

impl CachedSnapshot {
    pub fn new(snapshot: TelemetrySnapshot) -> Self {
        let repository = RunRepository::from_snapshot(&snapshot);
        Self {
            snapshot,
            repository,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshEvent {
    pub id: String,
    pub view: String,
    pub generation: u64,
    pub fallback: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// The last report stored for a view.
#[derive(Debug, Clone, Serialize)]
pub struct ViewResult {
    pub view: String,
    pub generation: u64,
    /// True when the fetch failed and the last good snapshot was used.
    pub fallback: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub report: AnalyticsReport,
}

#[derive(Default)]
struct ViewSlot {
    generation: u64,
    inflight: Option<AbortHandle>,
    latest: Option<Arc<ViewResult>>,
}

// ---------------------------------------------------------------------------
// Refresher
// ---------------------------------------------------------------------------

/// Owns snapshot fetching and per-view recomputation.
///
/// Each view keeps a generation counter. Starting a refresh bumps it and
/// aborts whatever was in flight for that view; a result is stored only if
/// its generation is still current when it finishes.
pub struct Refresher {
    source: SnapshotSource,
    config: Arc<AnalyticsConfig>,
    fetch_timeout: Duration,
    fetch_seq: AtomicU64,
    last_good: RwLock<Option<(u64, Arc<CachedSnapshot>)>>,
    views: Mutex<HashMap<String, ViewSlot>>,
    events: broadcast::Sender<RefreshEvent>,
}

impl Refresher {
    pub fn new(source: SnapshotSource, config: Arc<AnalyticsConfig>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            source,
            fetch_timeout: Duration::from_secs(config.api.timeout_seconds),
            config,
            fetch_seq: AtomicU64::new(0),
            last_good: RwLock::new(None),
            views: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn source(&self) -> &SnapshotSource {
        &self.source
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Last successfully fetched snapshot, if any.
    pub async fn current(&self) -> Option<Arc<CachedSnapshot>> {
        self.last_good.read().await.as_ref().map(|(_, c)| Arc::clone(c))
    }

    /// Last good snapshot, fetching once if nothing has been loaded yet.
    pub async fn snapshot(&self) -> Result<Arc<CachedSnapshot>, RefreshError> {
        if let Some(cached) = self.current().await {
            return Ok(cached);
        }
        self.fetch_with_fallback().await.map(|(cached, _)| cached)
    }

    pub async fn view(&self, view: &str) -> Option<Arc<ViewResult>> {
        self.views
            .lock()
            .await
            .get(view)
            .and_then(|slot| slot.latest.clone())
    }

    /// Start a new generation for `view`, aborting the one in flight.
    pub async fn begin(&self, view: &str) -> u64 {
        let mut views = self.views.lock().await;
        let slot = views.entry(view.to_string()).or_default();
        slot.generation += 1;
        if let Some(handle) = slot.inflight.take() {
            handle.abort();
            tracing::info!(view, generation = slot.generation, "superseding in-flight refresh");
        }
        slot.generation
    }

    /// Store `result` if `generation` is still the current one for `view`.
    pub async fn complete(
        &self,
        view: &str,
        generation: u64,
        result: ViewResult,
    ) -> Result<Arc<ViewResult>, RefreshError> {
        let mut views = self.views.lock().await;
        let slot = views.entry(view.to_string()).or_default();
        if slot.generation != generation {
            tracing::debug!(view, generation, current = slot.generation, "discarding stale result");
            return Err(RefreshError::Superseded {
                view: view.to_string(),
                generation,
            });
        }
        let result = Arc::new(result);
        slot.latest = Some(Arc::clone(&result));
        slot.inflight = None;
        Ok(result)
    }

    /// Fetch a fresh snapshot, or fall back to the last good one.
    ///
    /// Returns the snapshot and whether it is the fallback.
    pub async fn fetch_with_fallback(&self) -> Result<(Arc<CachedSnapshot>, bool), RefreshError> {
        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = tokio::time::timeout(self.fetch_timeout, self.source.load()).await;

        let failure = match outcome {
            Ok(Ok(snapshot)) => {
                let cached = tokio::task::spawn_blocking(move || CachedSnapshot::new(snapshot))
                    .await
                    .map_err(|e| RefreshError::Task(e.to_string()))?;
                let cached = Arc::new(cached);
                let mut slot = self.last_good.write().await;
                // A slower, older fetch must not replace a newer one.
                if slot.as_ref().map_or(true, |(stored, _)| *stored < seq) {
                    *slot = Some((seq, Arc::clone(&cached)));
                }
                return Ok((cached, false));
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {}s", self.fetch_timeout.as_secs()),
        };

        tracing::warn!(source = %self.source.describe(), error = %failure, "fetch failed, using last good snapshot");
        match self.current().await {
            Some(cached) => Ok((cached, true)),
            None => Err(RefreshError::NoSnapshot),
        }
    }

    /// Refresh `view`: fetch (with fallback), rebuild the report, store it
    /// if still current and broadcast an event.
    pub async fn refresh(
        self: &Arc<Self>,
        view: &str,
        request: ReportRequest,
    ) -> Result<Arc<ViewResult>, RefreshError> {
        let generation = self.begin(view).await;
        tracing::info!(view, generation, "refresh started");

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let (cached, fallback) = this.fetch_with_fallback().await?;
            let fetched_at = cached.snapshot.fetched_at;
            let config = Arc::clone(&this.config);
            let report = tokio::task::spawn_blocking(move || {
                build_report(&cached.repository, &request, &config)
            })
            .await
            .map_err(|e| RefreshError::Task(e.to_string()))?;
            Ok::<_, RefreshError>((report, fallback, fetched_at))
        });

        {
            let mut views = self.views.lock().await;
            let slot = views.entry(view.to_string()).or_default();
            if slot.generation == generation {
                slot.inflight = Some(task.abort_handle());
            } else {
                task.abort();
            }
        }

        let (report, fallback, fetched_at) = match task.await {
            Ok(result) => result?,
            Err(e) if e.is_cancelled() => {
                return Err(RefreshError::Superseded {
                    view: view.to_string(),
                    generation,
                })
            }
            Err(e) => return Err(RefreshError::Task(e.to_string())),
        };

        let stored = self
            .complete(
                view,
                generation,
                ViewResult {
                    view: view.to_string(),
                    generation,
                    fallback,
                    fetched_at,
                    report,
                },
            )
            .await?;

        let _ = self.events.send(RefreshEvent {
            id: uuid::Uuid::new_v4().to_string(),
            view: view.to_string(),
            generation,
            fallback,
            fetched_at,
        });
        tracing::info!(view, generation, fallback, "refresh complete");
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use playbook_core::playbook::Playbook;
    use playbook_core::run::PlaybookRun;
    use playbook_core::types::{Channel, Goal, PlaybookStatus, RunStatus, Segment};
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    fn write_snapshot(path: &Path, meetings: u64) {
        let playbook = Playbook {
            id: "pb".into(),
            name: "Enterprise ABM".into(),
            segment: Segment::Enterprise,
            goal: Goal::Pipeline,
            channel_mix: BTreeMap::from([(Channel::Email, 100.0)]),
            schedule_frequency: "daily".into(),
            status: PlaybookStatus::Active,
            quality: vec![],
        };
        let run = PlaybookRun {
            id: "r1".into(),
            playbook_id: "pb".into(),
            status: RunStatus::Completed,
            started_at: now() - chrono::Duration::days(2),
            completed_at: None,
            leads_targeted: 50,
            emails_sent: 40,
            responses: 8,
            meetings_booked: meetings,
            quality: vec![],
        };
        TelemetrySnapshot::new(vec![playbook], vec![run])
            .save(path)
            .unwrap();
    }

    fn refresher(path: &Path) -> Arc<Refresher> {
        Arc::new(Refresher::new(
            SnapshotSource::File(path.to_path_buf()),
            Arc::new(AnalyticsConfig::default()),
        ))
    }

    /// Stub playbook API whose first `/playbooks` request never answers.
    async fn stalling_api() -> (String, Arc<AtomicU64>) {
        use axum::routing::get;
        use axum::Json;

        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let app = axum::Router::new()
            .route(
                "/playbooks",
                get(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            std::future::pending::<()>().await;
                        }
                        Json(serde_json::json!([
                            {"id": "pb", "name": "Enterprise ABM", "segment": "enterprise"}
                        ]))
                    }
                }),
            )
            .route(
                "/playbooks/{id}/runs",
                get(|| async { Json(serde_json::json!([])) }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), hits)
    }

    fn remote_refresher(base_url: &str) -> Arc<Refresher> {
        let mut config = AnalyticsConfig::default();
        config.api.base_url = base_url.to_string();
        let client = crate::client::PlaybookApiClient::new(&config.api).unwrap();
        Arc::new(Refresher::new(SnapshotSource::Remote(client), Arc::new(config)))
    }

    fn view_result(r: &Refresher, generation: u64) -> ViewResult {
        let repo = RunRepository::new(vec![], vec![]);
        ViewResult {
            view: "v".into(),
            generation,
            fallback: false,
            fetched_at: None,
            report: build_report(&repo, &ReportRequest::new(now()), r.config()),
        }
    }

    #[tokio::test]
    async fn no_snapshot_before_first_success() {
        let dir = TempDir::new().unwrap();
        let r = refresher(&dir.path().join("missing.json"));
        let err = r.refresh("default", ReportRequest::new(now())).await.unwrap_err();
        assert!(matches!(err, RefreshError::NoSnapshot));
        assert!(r.view("default").await.is_none());
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_last_good() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        write_snapshot(&path, 3);
        let r = refresher(&path);

        let first = r.refresh("default", ReportRequest::new(now())).await.unwrap();
        assert!(!first.fallback);
        assert_eq!(first.report.timeline.summary.total_meetings, 3);

        std::fs::remove_file(&path).unwrap();
        let second = r.refresh("default", ReportRequest::new(now())).await.unwrap();
        assert!(second.fallback);
        assert_eq!(second.generation, first.generation + 1);
        assert_eq!(second.report.timeline.summary.total_meetings, 3);
    }

    #[tokio::test]
    async fn stale_generation_never_overwrites_newer() {
        let dir = TempDir::new().unwrap();
        let r = refresher(&dir.path().join("snapshot.json"));

        let older = r.begin("v").await;
        let newer = r.begin("v").await;
        assert!(newer > older);

        r.complete("v", newer, view_result(&r, newer)).await.unwrap();
        let err = r
            .complete("v", older, view_result(&r, older))
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Superseded { generation, .. } if generation == older));
        assert_eq!(r.view("v").await.unwrap().generation, newer);
    }

    #[tokio::test]
    async fn overlapping_refresh_supersedes_the_older_one() {
        let (base_url, hits) = stalling_api().await;
        let r = remote_refresher(&base_url);

        let older = tokio::spawn({
            let r = Arc::clone(&r);
            async move { r.refresh("v", ReportRequest::new(now())).await }
        });
        while hits.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let newer = r.refresh("v", ReportRequest::new(now())).await.unwrap();
        assert_eq!(newer.generation, 2);
        assert!(!newer.fallback);

        let err = older.await.unwrap().unwrap_err();
        assert!(matches!(err, RefreshError::Superseded { generation: 1, .. }));
        assert_eq!(r.view("v").await.unwrap().generation, 2);
    }

    #[tokio::test]
    async fn views_are_independent() {
        let dir = TempDir::new().unwrap();
        let r = refresher(&dir.path().join("snapshot.json"));
        assert_eq!(r.begin("a").await, 1);
        assert_eq!(r.begin("b").await, 1);
        assert_eq!(r.begin("a").await, 2);
    }

    #[tokio::test]
    async fn refresh_broadcasts_event() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        write_snapshot(&path, 1);
        let r = refresher(&path);
        let mut rx = r.subscribe();
        r.refresh("matrix", ReportRequest::new(now())).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.view, "matrix");
        assert_eq!(event.generation, 1);
        assert!(!event.fallback);
    }

    #[tokio::test]
    async fn snapshot_loads_lazily() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        write_snapshot(&path, 2);
        let r = refresher(&path);
        assert!(r.current().await.is_none());
        let cached = r.snapshot().await.unwrap();
        assert_eq!(cached.repository.runs().len(), 1);
        assert!(r.current().await.is_some());
    }
}
