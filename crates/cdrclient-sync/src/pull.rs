//! Pull loop
//!
//! Every connector is drained on a fixed schedule: download the next queued
//! document into the in-flight folder, acknowledge it, then move it to the
//! target folder chosen by its document type.
//!
//! ```text
//! PullScheduler ──tick──→ per connector (guarded, limited) ──→ PullLoop::run_cycle
//!                                                                 │
//!        ┌──────────── GET ?limit=1 ◀──────────────────────────────┘
//!        ├─ 204 ─→ cycle ends
//!        └─ 200 ─→ <id>.tmp ─→ DELETE /<id> ─→ detect type ─→ <target>/<id>.xml
//! ```
//!
//! Downloads of one connector are strictly sequential. Any result other than
//! a document or "no content" aborts the cycle; the next tick starts over.
//! A failed acknowledgement leaves the temp file where it is, so the
//! platform delivers the document again and it is never lost.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cdrclient_core::domain::connector::Connector;
use cdrclient_core::domain::document_type::{DocumentType, DETECTION_HEAD_BYTES};
use cdrclient_core::domain::newtypes::{PullResultId, TraceId};
use cdrclient_core::domain::results::{AckResult, DownloadResult};
use cdrclient_core::ports::IDocumentApi;
use cdrclient_core::router::ConnectorRouter;
use dashmap::DashMap;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::fsops::move_file;

/// Extension of a routed document in its target folder
const DOCUMENT_EXTENSION: &str = "xml";

// ============================================================================
// PullLoop
// ============================================================================

/// Why a pull cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEnd {
    /// The platform reported no more content
    Drained,
    /// A download, acknowledgement or local step failed
    Aborted(String),
    /// Shutdown was requested between documents
    Cancelled,
}

/// Summary of one pull cycle for one connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Documents downloaded, acknowledged and routed during the cycle
    pub processed: usize,
    pub end: CycleEnd,
}

/// Drains the remote queue of a connector
pub struct PullLoop {
    api: Arc<dyn IDocumentApi>,
    router: Arc<ConnectorRouter>,
}

impl PullLoop {
    pub fn new(api: Arc<dyn IDocumentApi>, router: Arc<ConnectorRouter>) -> Self {
        Self { api, router }
    }

    pub fn router(&self) -> &ConnectorRouter {
        &self.router
    }

    /// Downloads documents for `connector` until the queue is empty, a step
    /// fails, or `cancel` fires
    pub async fn run_cycle(&self, connector: &Connector, cancel: &CancellationToken) -> CycleReport {
        let in_flight_dir = self.router.in_flight_folder_for(connector);
        if let Err(e) = tokio::fs::create_dir_all(&in_flight_dir).await {
            return self.report(0, CycleEnd::Aborted(format!("in-flight folder: {e}")));
        }

        let mut processed = 0;
        loop {
            if cancel.is_cancelled() {
                return self.report(processed, CycleEnd::Cancelled);
            }

            let trace_id = TraceId::new();
            match self.api.download_next(connector, &in_flight_dir, &trace_id).await {
                DownloadResult::NoContent => return self.report(processed, CycleEnd::Drained),
                DownloadResult::Success {
                    pull_result_id,
                    file,
                } => {
                    if let Err(reason) = self
                        .acknowledge_and_route(connector, &pull_result_id, &file, &trace_id)
                        .await
                    {
                        return self.report(processed, CycleEnd::Aborted(reason));
                    }
                    processed += 1;
                }
                DownloadResult::ClientError { status, body } => {
                    return self.report(
                        processed,
                        CycleEnd::Aborted(format!("download rejected with {status}: {body}")),
                    );
                }
                DownloadResult::ServerError { status, body } => {
                    return self.report(
                        processed,
                        CycleEnd::Aborted(format!("download failed with {status}: {body}")),
                    );
                }
                DownloadResult::TransportError(cause) => {
                    return self.report(
                        processed,
                        CycleEnd::Aborted(format!("download transport failure: {cause}")),
                    );
                }
            }
        }
    }

    fn report(&self, processed: usize, end: CycleEnd) -> CycleReport {
        match &end {
            CycleEnd::Aborted(reason) => {
                warn!(processed, reason = %reason, "Pull cycle aborted");
            }
            CycleEnd::Drained | CycleEnd::Cancelled => {
                info!(processed, end = ?end, "Pull cycle finished");
            }
        }
        CycleReport { processed, end }
    }

    async fn acknowledge_and_route(
        &self,
        connector: &Connector,
        pull_result_id: &PullResultId,
        file: &Path,
        trace_id: &TraceId,
    ) -> Result<PathBuf, String> {
        match self.api.acknowledge(connector, pull_result_id, trace_id).await {
            AckResult::Success => {}
            AckResult::ClientError { status, body } | AckResult::ServerError { status, body } => {
                return Err(format!(
                    "acknowledge of {pull_result_id} failed with {status}: {body}"
                ));
            }
            AckResult::TransportError(cause) => {
                return Err(format!(
                    "acknowledge of {pull_result_id} transport failure: {cause}"
                ));
            }
        }

        let doc_type = detect_document_type(file).await;
        let target_dir = self.router.target_folder_for(connector, doc_type);
        let routed = route_into(file, target_dir, pull_result_id)
            .await
            .map_err(|e| format!("routing {pull_result_id} failed: {e}"))?;

        info!(
            pull_result_id = %pull_result_id,
            doc_type = ?doc_type,
            target = %routed.display(),
            "Document received"
        );
        Ok(routed)
    }
}

/// Reads the head of `file` and detects its document type
///
/// Unreadable files yield `None` and are routed to the base target folder.
async fn detect_document_type(file: &Path) -> Option<DocumentType> {
    let mut head = Vec::with_capacity(DETECTION_HEAD_BYTES);
    let read = async {
        let f = tokio::fs::File::open(file).await?;
        f.take(DETECTION_HEAD_BYTES as u64).read_to_end(&mut head).await
    };
    if let Err(e) = read.await {
        warn!(path = %file.display(), error = %e, "Cannot read document head for type detection");
        return None;
    }
    DocumentType::detect(&head)
}

/// Moves the temp file into `target_dir` and then gives it its final
/// `.xml` name, so consumers of the target folder never see a partial file
async fn route_into(
    file: &Path,
    target_dir: &Path,
    pull_result_id: &PullResultId,
) -> std::io::Result<PathBuf> {
    let staged = match file.file_name() {
        Some(name) => target_dir.join(name),
        None => target_dir.join(pull_result_id.as_str()),
    };
    move_file(file, &staged).await?;

    let final_path = target_dir.join(format!("{pull_result_id}.{DOCUMENT_EXTENSION}"));
    tokio::fs::rename(&staged, &final_path).await?;
    Ok(final_path)
}

// ============================================================================
// PullScheduler
// ============================================================================

/// Removes a connector's "running" mark when its cycle ends
struct RunningGuard {
    running: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.remove(&self.key);
    }
}

/// Starts pull cycles for every connector on a fixed interval
///
/// A connector whose previous cycle is still running is skipped for that
/// tick. At most `parallelism` connectors download at the same time.
pub struct PullScheduler {
    pull: Arc<PullLoop>,
    permits: Arc<Semaphore>,
    running: Arc<DashMap<String, ()>>,
    interval: Duration,
    tracker: TaskTracker,
}

impl PullScheduler {
    pub fn new(pull: Arc<PullLoop>, parallelism: usize, interval: Duration) -> Self {
        Self {
            pull,
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
            running: Arc::new(DashMap::new()),
            interval,
            tracker: TaskTracker::new(),
        }
    }

    /// Tracker of every spawned pull cycle
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Whether a cycle for the connector with this key is running
    pub fn is_running(&self, connector_key: &str) -> bool {
        self.running.contains_key(connector_key)
    }

    /// Spawns a cycle for every connector that is not already running
    ///
    /// Returns the number of cycles spawned.
    pub fn tick(&self, cancel: &CancellationToken) -> usize {
        let mut spawned = 0;

        for connector in self.pull.router().connectors() {
            let key = connector.key();
            if self.running.insert(key.clone(), ()).is_some() {
                debug!(connector = %key, "Previous pull cycle still running, skipping");
                continue;
            }
            let guard = RunningGuard {
                running: self.running.clone(),
                key,
            };

            let span = info_span!(
                "pull",
                connector = %connector.id,
                mode = %connector.mode
            );
            let pull = self.pull.clone();
            let permits = self.permits.clone();
            let connector = connector.clone();
            let cancel = cancel.clone();

            self.tracker.spawn(
                async move {
                    let _guard = guard;
                    let _permit = tokio::select! {
                        _ = cancel.cancelled() => return,
                        permit = permits.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => {
                                error!("Download limiter closed");
                                return;
                            }
                        },
                    };
                    pull.run_cycle(&connector, &cancel).await;
                }
                .instrument(span),
            );
            spawned += 1;
        }

        spawned
    }

    /// Ticks every interval until cancelled; the first tick is immediate
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            connectors = self.pull.router().connectors().len(),
            interval_secs = self.interval.as_secs(),
            "Pull scheduler started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let spawned = self.tick(&cancel);
                    debug!(spawned, "Pull tick");
                }
            }
        }
        info!("Pull scheduler stopped");
    }

    /// Waits until every spawned cycle has finished
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
