//! Filesystem event producer
//!
//! Wraps the `notify` crate to watch every upload source folder and emits
//! the path of each file that appears or is written there. The emitted
//! paths are candidates only; the pipeline applies the file type and
//! deduplication filters.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  FolderWatcher ──→ mpsc::channel ──→ run_watcher ──→ pipeline candidates
//! ```

use std::path::{Path, PathBuf};

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::SyncError;

/// Capacity of the channel between the notify callback thread and the
/// async side
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// FolderWatcher
// ============================================================================

/// Watches folders (non-recursively) for new or rewritten files
///
/// On Linux this uses inotify. Each relevant event is reduced to one path
/// and sent through the channel returned by [`FolderWatcher::new`]. The
/// watch stops when the `FolderWatcher` is dropped.
pub struct FolderWatcher {
    watcher: RecommendedWatcher,
}

impl FolderWatcher {
    /// Creates a watcher and the receiver its paths are delivered on
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new() -> Result<(Self, mpsc::Receiver<PathBuf>), SyncError> {
        let (tx, rx) = mpsc::channel::<PathBuf>(EVENT_CHANNEL_CAPACITY);

        let watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(path) = candidate_path(&event) {
                        if let Err(e) = tx.blocking_send(path) {
                            warn!(error = %e, "Failed to forward file event (receiver dropped)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )?;

        Ok((Self { watcher }, rx))
    }

    /// Starts watching `path` for files created or written directly in it
    ///
    /// # Errors
    /// Returns an error if the folder does not exist, is not readable, or the
    /// inotify watch limit is reached
    pub fn watch(&mut self, path: &Path) -> Result<(), SyncError> {
        info!(path = %path.display(), "Watching folder");
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(())
    }
}

/// Reduces a `notify::Event` to the path of the file that may now be ready
///
/// - `Create(File | Any)` -> the created path
/// - `Modify(Data(*))` -> the written path
/// - `Modify(Name(To))` -> the path a file was moved to
/// - `Modify(Name(Both))` -> the destination (second) path
/// - `Access(Close(Write))` -> the closed path
///
/// Removals, metadata changes and folder creation are ignored.
fn candidate_path(event: &notify::Event) -> Option<PathBuf> {
    let paths = &event.paths;

    let path = match &event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => paths.first(),
        EventKind::Modify(ModifyKind::Data(_)) => paths.first(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths.first(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => paths.get(1),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => paths.first(),
        _ => None,
    }?;

    debug!(path = %path.display(), kind = ?event.kind, "File event");
    Some(path.clone())
}

// ============================================================================
// Watch producer
// ============================================================================

/// Watches `folders` and forwards every candidate path to `out`
///
/// Runs until cancelled. A folder that cannot be watched is logged and
/// skipped so the remaining folders keep producing. Returns an error when
/// the watcher cannot be created, the notify side stops delivering, or the
/// consumer goes away; the supervisor restarts the producer in those cases.
pub async fn run_watcher(
    folders: Vec<PathBuf>,
    out: mpsc::Sender<PathBuf>,
    cancel: CancellationToken,
) -> Result<(), SyncError> {
    let (mut watcher, mut events) = FolderWatcher::new()?;
    let mut watched = 0usize;
    for folder in &folders {
        match watcher.watch(folder) {
            Ok(()) => watched += 1,
            Err(e) => warn!(
                folder = %folder.display(),
                error = %e,
                "Cannot watch folder, relying on the poller for it"
            ),
        }
    }
    info!(folders = folders.len(), watched, "File watcher started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("File watcher stopping");
                return Err(SyncError::Cancelled);
            }
            event = events.recv() => {
                let Some(path) = event else {
                    return Err(SyncError::ChannelClosed("file events"));
                };
                if out.send(path).await.is_err() {
                    return Err(SyncError::ChannelClosed("upload candidates"));
                }
            }
        }
    }
}
