//! Restart loop for long-running producers
//!
//! The watcher and the poller are expected to run for the life of the
//! process. If one of them fails, [`supervise`] logs the failure and starts
//! a fresh instance after a fixed delay. Cancellation stops it for good.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::SyncError;

/// Runs the producer built by `start` until `cancel` fires, restarting it
/// after `restart_delay` whenever it ends for any other reason
///
/// # Arguments
/// * `name` - Producer name used in log lines
/// * `restart_delay` - Pause between a failure and the next start
/// * `cancel` - Shutdown signal; also handed to every producer instance
/// * `start` - Builds a new producer instance
///
/// Returns the number of restarts performed.
pub async fn supervise<F, Fut>(
    name: &'static str,
    restart_delay: Duration,
    cancel: CancellationToken,
    mut start: F,
) -> u32
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), SyncError>>,
{
    let mut restarts = 0u32;

    loop {
        let outcome = start(cancel.clone()).await;

        if cancel.is_cancelled() {
            info!(producer = name, restarts, "Producer stopped");
            return restarts;
        }

        match outcome {
            Err(e) if e.is_cancelled() => {
                info!(producer = name, restarts, "Producer cancelled");
                return restarts;
            }
            Err(e) => {
                error!(
                    producer = name,
                    error = %e,
                    delay_secs = restart_delay.as_secs(),
                    "Producer failed, restarting after delay"
                );
            }
            Ok(()) => {
                warn!(
                    producer = name,
                    delay_secs = restart_delay.as_secs(),
                    "Producer exited unexpectedly, restarting after delay"
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!(producer = name, restarts, "Producer stopped during restart delay");
                return restarts;
            }
            _ = tokio::time::sleep(restart_delay) => {}
        }
        restarts += 1;
    }
}
