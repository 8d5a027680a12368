//! Periodic directory listing producer
//!
//! Complements the watcher: events can be lost (watch limits, files present
//! before startup, network filesystems), so every source folder is also
//! listed on a fixed interval. Entries are emitted oldest-modified first.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SyncError;

/// Lists the files directly inside `folder`, ordered by ascending
/// modification time
///
/// Entries whose metadata cannot be read (for example because they vanished
/// between listing and inspection) are skipped.
///
/// # Errors
/// Returns an error if the folder itself cannot be read
pub async fn list_by_modified(folder: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((modified, entry.path()));
    }

    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Lists every folder each `interval` and forwards the entries to `out`
///
/// The first listing happens immediately. Runs until cancelled. A folder
/// that cannot be listed is logged and skipped for this tick; a closed
/// consumer ends the run with an error so the supervisor can restart it.
pub async fn run_poller(
    folders: Vec<PathBuf>,
    interval: Duration,
    out: mpsc::Sender<PathBuf>,
    cancel: CancellationToken,
) -> Result<(), SyncError> {
    info!(
        folders = folders.len(),
        interval_secs = interval.as_secs(),
        "Folder poller started"
    );
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Folder poller stopping");
                return Err(SyncError::Cancelled);
            }
            _ = ticker.tick() => {
                for folder in &folders {
                    let files = match list_by_modified(folder).await {
                        Ok(files) => files,
                        Err(e) => {
                            warn!(folder = %folder.display(), error = %e, "Cannot list folder");
                            continue;
                        }
                    };
                    debug!(folder = %folder.display(), count = files.len(), "Polled folder");
                    for file in files {
                        if out.send(file).await.is_err() {
                            return Err(SyncError::ChannelClosed("upload candidates"));
                        }
                    }
                }
            }
        }
    }
}
