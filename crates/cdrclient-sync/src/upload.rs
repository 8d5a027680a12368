//! Retry upload state machine
//!
//! Drives one candidate file from discovery to a terminal state:
//!
//! ```text
//! Start ──busy-wait──→ Marked (.upload) ──→ Uploading ──→ Done (archived / deleted)
//!   │                                        │    ▲
//!   └─ still busy: skip this cycle           │    └── Retrying (5xx, transport)
//!                                            └──────→ Parked (.error + .response)
//! ```
//!
//! ## Design Decisions
//!
//! - **Busy check first**: a busy file keeps its `.xml` name so the next
//!   trigger rediscovers it; only an idle file is marked.
//! - **Marker rename**: the file is renamed to `.upload` before the first
//!   request, so producers no longer see it as a candidate.
//! - **Permits per attempt**: the upload limiter is held only for the
//!   request itself; busy waits and backoff sleeps run without a permit.
//! - **Retry forever**: server and transport failures are retried following
//!   the [`RetryPolicy`] until success, a client error, or cancellation.
//! - **Rollback on cancel**: the `.upload` marker is renamed back so the
//!   file is picked up again after restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cdrclient_core::domain::connector::Connector;
use cdrclient_core::domain::newtypes::TraceId;
use cdrclient_core::domain::results::UploadResult;
use cdrclient_core::domain::retry::RetryPolicy;
use cdrclient_core::ports::IDocumentApi;
use cdrclient_core::router::ConnectorRouter;
use chrono::Local;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::busy::BusyFileDetector;
use crate::fsops::{move_file, unique_stem};
use crate::SyncError;

/// Extension of a file while its upload is in progress
pub const UPLOAD_EXTENSION: &str = "upload";

/// Extension of a rejected document in the error folder
pub const ERROR_EXTENSION: &str = "error";

/// Extension of the rejection body stored next to the rejected document
pub const RESPONSE_EXTENSION: &str = "response";

/// Terminal state of one pass through the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Accepted by the platform; `archived_to` is `None` when deleted
    Uploaded {
        archived_to: Option<PathBuf>,
        attempts: u32,
    },
    /// Permanently rejected and moved to the error folder
    Parked {
        status: u16,
        error_file: PathBuf,
        response_file: PathBuf,
    },
    /// Still being written when the busy timeout elapsed; left in place
    Busy,
    /// The file disappeared before or during processing
    Vanished,
    /// Shutdown was requested; the marker was rolled back
    Cancelled,
}

/// Result of the retry loop: a classification that ends retrying
enum Settled {
    Accepted { attempts: u32 },
    Rejected { status: u16, body: String },
    Vanished,
    Cancelled,
}

/// Uploads single files with busy detection, retries and archival
pub struct RetryUploader {
    api: Arc<dyn IDocumentApi>,
    router: Arc<ConnectorRouter>,
    busy: BusyFileDetector,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl RetryUploader {
    /// Creates an uploader allowing `parallelism` concurrent requests
    pub fn new(
        api: Arc<dyn IDocumentApi>,
        router: Arc<ConnectorRouter>,
        busy: BusyFileDetector,
        retry: RetryPolicy,
        parallelism: usize,
    ) -> Self {
        Self {
            api,
            router,
            busy,
            retry,
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
        }
    }

    pub fn router(&self) -> &ConnectorRouter {
        &self.router
    }

    /// Runs the state machine for `path`, owned by `connector`
    ///
    /// # Errors
    /// Returns an error only for local filesystem failures while marking,
    /// archiving or parking the file. Remote failures are retried or parked.
    pub async fn process(
        &self,
        connector: &Connector,
        path: &Path,
        trace_id: &TraceId,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, SyncError> {
        let idle = tokio::select! {
            _ = cancel.cancelled() => return Ok(UploadOutcome::Cancelled),
            idle = self.busy.wait_until_idle(path) => idle,
        };
        if !idle {
            info!(path = %path.display(), "File still busy, leaving it for the next cycle");
            return Ok(UploadOutcome::Busy);
        }

        let marked = path.with_extension(UPLOAD_EXTENSION);
        match tokio::fs::rename(path, &marked).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "File vanished before upload");
                return Ok(UploadOutcome::Vanished);
            }
            Err(e) => return Err(e.into()),
        }

        match self.upload_until_settled(connector, &marked, trace_id, cancel).await {
            Settled::Accepted { attempts } => {
                let archived_to = self.archive_or_delete(connector, &marked).await?;
                info!(
                    path = %path.display(),
                    attempts,
                    archived = archived_to.is_some(),
                    "Document uploaded"
                );
                Ok(UploadOutcome::Uploaded {
                    archived_to,
                    attempts,
                })
            }
            Settled::Rejected { status, body } => {
                let (error_file, response_file) = self.park(connector, &marked, &body).await?;
                warn!(
                    path = %path.display(),
                    status,
                    error_file = %error_file.display(),
                    "Document rejected by the platform, parked"
                );
                Ok(UploadOutcome::Parked {
                    status,
                    error_file,
                    response_file,
                })
            }
            Settled::Vanished => Ok(UploadOutcome::Vanished),
            Settled::Cancelled => {
                if let Err(e) = tokio::fs::rename(&marked, path).await {
                    warn!(
                        path = %marked.display(),
                        error = %e,
                        "Could not restore original name after cancellation"
                    );
                }
                info!(path = %path.display(), "Upload cancelled");
                Ok(UploadOutcome::Cancelled)
            }
        }
    }

    async fn upload_until_settled(
        &self,
        connector: &Connector,
        marked: &Path,
        trace_id: &TraceId,
        cancel: &CancellationToken,
    ) -> Settled {
        let mut retries = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Settled::Cancelled,
                result = self.attempt(connector, marked, trace_id) => result,
            };

            match result {
                UploadResult::Success => {
                    return Settled::Accepted {
                        attempts: retries + 1,
                    }
                }
                UploadResult::ClientError { status, body } => {
                    return Settled::Rejected { status, body }
                }
                UploadResult::ServerError { status, body } => {
                    warn!(path = %marked.display(), status, body = %body, retries, "Upload failed on the server");
                }
                UploadResult::TransportError(cause) => {
                    warn!(path = %marked.display(), cause = %cause, retries, "Upload transport failure");
                }
            }

            if !tokio::fs::try_exists(marked).await.unwrap_or(true) {
                warn!(path = %marked.display(), "File removed while retrying, giving up");
                return Settled::Vanished;
            }

            let delay = self.retry.delay_for(retries);
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before retry");
            tokio::select! {
                _ = cancel.cancelled() => return Settled::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
            retries = retries.saturating_add(1);
        }
    }

    /// One request, holding an upload permit for its duration
    async fn attempt(&self, connector: &Connector, marked: &Path, trace_id: &TraceId) -> UploadResult {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return UploadResult::TransportError("Upload limiter closed".to_string()),
        };
        self.api.upload(connector, marked, trace_id).await
    }

    async fn archive_or_delete(
        &self,
        connector: &Connector,
        marked: &Path,
    ) -> Result<Option<PathBuf>, SyncError> {
        let today = Local::now().date_naive();
        match self.router.archive_folder_for(connector, today) {
            Some(folder) => {
                let target = folder.join(format!("{}.xml", unique_stem(marked)));
                move_file(marked, &target).await?;
                Ok(Some(target))
            }
            None => {
                tokio::fs::remove_file(marked).await?;
                Ok(None)
            }
        }
    }

    /// Renames the marked file to `.error`, stores the response body next to
    /// it and relocates both to the connector's error folder
    async fn park(
        &self,
        connector: &Connector,
        marked: &Path,
        body: &str,
    ) -> Result<(PathBuf, PathBuf), SyncError> {
        let current = marked.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = unique_stem(marked);
        let error_name = format!("{stem}.{ERROR_EXTENSION}");
        let response_name = format!("{stem}.{RESPONSE_EXTENSION}");

        let error_file = current.join(&error_name);
        let response_file = current.join(&response_name);
        tokio::fs::rename(marked, &error_file).await?;
        tokio::fs::write(&response_file, body).await?;

        let error_dir = self
            .router
            .error_folder_for(connector, Local::now().date_naive());
        if error_dir == current {
            return Ok((error_file, response_file));
        }

        let parked_error = error_dir.join(&error_name);
        let parked_response = error_dir.join(&response_name);
        move_file(&error_file, &parked_error).await?;
        move_file(&response_file, &parked_response).await?;
        Ok((parked_error, parked_response))
    }
}
