//! Upload intake pipeline
//!
//! Merges the watcher and the poller into one stream of candidate paths,
//! filters and deduplicates them, and dispatches one task per accepted path
//! to the [`RetryUploader`].
//!
//! ## Flow
//!
//! ```text
//! supervise(run_watcher) ──┐
//!                          ├──→ mpsc ──→ UploadPipeline::run ──→ filter ──→ TaskTracker::spawn
//! supervise(run_poller) ───┘                                              (RetryUploader::process)
//! ```
//!
//! Filters apply in order: regular file, `.xml` extension, owning connector,
//! insert into the [`InFlightSet`]. The entry is removed when the task ends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cdrclient_core::config::UploadConfig;
use cdrclient_core::domain::newtypes::TraceId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, Instrument};

use crate::fsops::has_extension;
use crate::in_flight::InFlightSet;
use crate::poller::{list_by_modified, run_poller};
use crate::supervisor::supervise;
use crate::upload::RetryUploader;
use crate::watcher::run_watcher;
use crate::SyncError;

/// Capacity of the channel merging both producers
const CANDIDATE_CHANNEL_CAPACITY: usize = 1024;

/// Extension of documents eligible for upload
const DOCUMENT_EXTENSION: &str = "xml";

/// Producer settings for [`UploadPipeline::spawn`]
#[derive(Debug, Clone)]
pub struct IntakeOptions {
    pub watcher_enabled: bool,
    pub poll_interval: Duration,
    pub restart_delay: Duration,
}

impl IntakeOptions {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            watcher_enabled: config.watcher_enabled,
            poll_interval: config.poll_interval(),
            restart_delay: config.restart_delay(),
        }
    }
}

/// Deduplicating dispatcher of upload tasks
pub struct UploadPipeline {
    uploader: Arc<RetryUploader>,
    in_flight: Arc<InFlightSet>,
    tracker: TaskTracker,
}

impl UploadPipeline {
    pub fn new(uploader: Arc<RetryUploader>, in_flight: Arc<InFlightSet>) -> Self {
        Self {
            uploader,
            in_flight,
            tracker: TaskTracker::new(),
        }
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Tracker of every spawned upload task
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Filters `path` and, if accepted, spawns its upload task
    ///
    /// Returns whether a task was spawned.
    pub async fn submit(&self, path: PathBuf, cancel: &CancellationToken) -> bool {
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file || !has_extension(&path, DOCUMENT_EXTENSION) {
            return false;
        }

        let Some(connector) = self.uploader.router().connector_for_path(&path).cloned() else {
            debug!(path = %path.display(), "No connector owns this path, ignoring");
            return false;
        };

        if !self.in_flight.try_insert(&path) {
            debug!(path = %path.display(), "Already in flight, dropping duplicate");
            return false;
        }

        let trace_id = TraceId::new();
        let span = info_span!(
            "upload",
            trace_id = %trace_id,
            connector = %connector.key(),
            path = %path.display()
        );
        let uploader = self.uploader.clone();
        let in_flight = self.in_flight.clone();
        let cancel = cancel.clone();

        self.tracker.spawn(
            async move {
                match uploader.process(&connector, &path, &trace_id, &cancel).await {
                    Ok(outcome) => debug!(?outcome, "Upload task finished"),
                    Err(e) => error!(error = %e, "Upload task failed"),
                }
                if !in_flight.remove(&path) {
                    error!(
                        path = %path.display(),
                        "Finished path was not in the in-flight set; state management bug"
                    );
                }
            }
            .instrument(span),
        );
        true
    }

    /// Consumes candidates until cancelled or all producers are gone
    pub async fn run(&self, mut candidates: mpsc::Receiver<PathBuf>, cancel: CancellationToken) {
        info!("Upload pipeline started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                candidate = candidates.recv() => match candidate {
                    Some(path) => {
                        self.submit(path, &cancel).await;
                    }
                    None => break,
                },
            }
        }
        info!(in_flight = self.in_flight.len(), "Upload pipeline stopped");
    }

    /// Lists every source folder once and submits the entries
    ///
    /// Returns the number of tasks spawned.
    ///
    /// # Errors
    /// Returns an error if a source folder cannot be listed
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<usize, SyncError> {
        let mut spawned = 0;
        for folder in self.uploader.router().source_folders() {
            for path in list_by_modified(&folder).await? {
                if self.submit(path, cancel).await {
                    spawned += 1;
                }
            }
        }
        Ok(spawned)
    }

    /// Waits until every spawned task has finished
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Starts the producers and the consumer
    ///
    /// The watcher only runs when enabled; the poller always runs. Both are
    /// supervised and restarted on failure. All returned tasks end once
    /// `cancel` fires.
    pub fn spawn(
        self: &Arc<Self>,
        options: IntakeOptions,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let (tx, rx) = mpsc::channel::<PathBuf>(CANDIDATE_CHANNEL_CAPACITY);
        let folders = self.uploader.router().source_folders();
        let restart_delay = options.restart_delay;
        let poll_interval = options.poll_interval;
        let mut handles = Vec::new();

        if options.watcher_enabled {
            let folders = folders.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(
                async move {
                    supervise("watcher", restart_delay, cancel, move |token| {
                        run_watcher(folders.clone(), tx.clone(), token)
                    })
                    .await;
                }
                .instrument(info_span!("watcher")),
            ));
        }

        {
            let cancel = cancel.clone();
            handles.push(tokio::spawn(
                async move {
                    supervise("poller", restart_delay, cancel, move |token| {
                        run_poller(folders.clone(), poll_interval, tx.clone(), token)
                    })
                    .await;
                }
                .instrument(info_span!("poller")),
            ));
        }

        let pipeline = self.clone();
        handles.push(tokio::spawn(async move {
            pipeline.run(rx, cancel).await;
        }));

        handles
    }
}
