//! Busy-file detection
//!
//! Producers may discover a file while another process is still writing it.
//! Before an upload starts, the retry state machine asks the
//! [`BusyFileDetector`] to wait until the file looks idle.
//!
//! ## Strategies
//!
//! - [`BusyFileStrategy::NeverBusy`] - every file is idle
//! - [`BusyFileStrategy::AlwaysBusy`] - every file is busy (tests only)
//! - [`BusyFileStrategy::SizeChanged`] - the size is sampled twice, separated
//!   by an interval; a file whose size changed is busy

use std::path::Path;
use std::time::Duration;

use cdrclient_core::config::{BusyFileConfig, BusyFileStrategyKind};
use tracing::{debug, warn};

/// Pause between two checks when the strategy does not sample over time
const RECHECK_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// BusyFileStrategy
// ============================================================================

/// How to decide whether a file is still being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyFileStrategy {
    NeverBusy,
    AlwaysBusy,
    /// Busy if the size differs between two samples taken `interval` apart
    SizeChanged(Duration),
}

impl BusyFileStrategy {
    pub fn from_config(config: &BusyFileConfig) -> Self {
        match config.strategy {
            BusyFileStrategyKind::NeverBusy => BusyFileStrategy::NeverBusy,
            BusyFileStrategyKind::AlwaysBusy => BusyFileStrategy::AlwaysBusy,
            BusyFileStrategyKind::SizeChanged => BusyFileStrategy::SizeChanged(config.interval()),
        }
    }

    /// Checks once whether `path` is busy
    ///
    /// For `SizeChanged`, a file whose metadata cannot be read is reported as
    /// not busy; the upload attempt that follows surfaces the real problem.
    pub async fn is_busy(&self, path: &Path) -> bool {
        match self {
            BusyFileStrategy::NeverBusy => false,
            BusyFileStrategy::AlwaysBusy => true,
            BusyFileStrategy::SizeChanged(interval) => size_changed(path, *interval).await,
        }
    }
}

async fn size_changed(path: &Path, interval: Duration) -> bool {
    let size_first = match tokio::fs::metadata(path).await {
        Ok(m) => m.len(),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "Cannot read file metadata for busy check, treating as idle"
            );
            return false;
        }
    };

    tokio::time::sleep(interval).await;

    let size_second = match tokio::fs::metadata(path).await {
        Ok(m) => m.len(),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "Cannot read file metadata on second busy check, treating as idle"
            );
            return false;
        }
    };

    let busy = size_first != size_second;
    debug!(
        path = %path.display(),
        size_first,
        size_second,
        busy,
        "File busy check"
    );
    busy
}

// ============================================================================
// BusyFileDetector
// ============================================================================

/// Repeats a [`BusyFileStrategy`] check until the file is idle or a timeout
/// elapses
#[derive(Debug, Clone)]
pub struct BusyFileDetector {
    strategy: BusyFileStrategy,
    timeout: Duration,
}

impl BusyFileDetector {
    pub fn new(strategy: BusyFileStrategy, timeout: Duration) -> Self {
        Self { strategy, timeout }
    }

    pub fn from_config(config: &BusyFileConfig) -> Self {
        Self::new(BusyFileStrategy::from_config(config), config.timeout())
    }

    pub fn strategy(&self) -> BusyFileStrategy {
        self.strategy
    }

    /// Waits until `path` is idle
    ///
    /// Returns `false` if the file was still busy when the timeout elapsed.
    /// That is not an error: the caller skips the file for this cycle and a
    /// later trigger rediscovers it.
    pub async fn wait_until_idle(&self, path: &Path) -> bool {
        let strategy = self.strategy;
        let poll = async move {
            while strategy.is_busy(path).await {
                debug!(path = %path.display(), "File is busy, checking again");
                if !matches!(strategy, BusyFileStrategy::SizeChanged(_)) {
                    tokio::time::sleep(RECHECK_DELAY).await;
                }
            }
        };

        match tokio::time::timeout(self.timeout, poll).await {
            Ok(()) => true,
            Err(_) => {
                debug!(
                    path = %path.display(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "File still busy after timeout, skipping this cycle"
                );
                false
            }
        }
    }
}

impl Default for BusyFileDetector {
    fn default() -> Self {
        Self::from_config(&BusyFileConfig::default())
    }
}
