//! cdrclient Sync - document synchronization engine
//!
//! Provides:
//! - Dual-trigger upload discovery (filesystem events and directory polling)
//! - A deduplicating, bounded-concurrency upload pipeline
//! - The per-file retry upload state machine
//! - The per-connector pull loop
//!
//! ## Modules
//!
//! - [`busy`] - Detects files that are still being written
//! - [`in_flight`] - Bounded set of paths currently being processed (oldest-inserted evicted first)
//! - [`watcher`] - notify-based producer of candidate files
//! - [`poller`] - Periodic directory listing producer
//! - [`supervisor`] - Restart loop for long-running producers
//! - [`upload`] - Retry upload state machine for one file
//! - [`pipeline`] - Merges producers and dispatches uploads
//! - [`pull`] - Download, acknowledge and route documents per connector
//! - [`fsops`] - Cross-filesystem safe moves

pub mod busy;
pub mod fsops;
pub mod in_flight;
pub mod pipeline;
pub mod poller;
pub mod pull;
pub mod supervisor;
pub mod upload;
pub mod watcher;

use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The OS file watcher could not be created or attached
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// The consumer of a producer channel has gone away
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// The operation observed the shutdown signal
    #[error("Cancelled")]
    Cancelled,

    /// A domain-level error propagated from cdrclient-core
    #[error("Domain error: {0}")]
    DomainError(#[from] cdrclient_core::domain::errors::DomainError),
}

impl SyncError {
    /// Whether this error is the result of cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
