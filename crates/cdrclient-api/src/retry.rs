//! Transport retry policy
//!
//! Token acquisition and credential renewal go through a bounded retry:
//! transient failures (IO errors, 5xx) are retried with exponential backoff,
//! everything else is returned immediately.
//!
//! Backoff schedule for a base delay of 1s: 1s, 2s, 4s, ...

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use cdrclient_core::config::AuthConfig;
use tracing::{info, warn};

use crate::{ApiError, AuthError};

/// Errors that know whether retrying the same call may succeed
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for AuthError {
    fn is_transient(&self) -> bool {
        matches!(self, AuthError::Retryable(_))
    }
}

impl Transient for ApiError {
    fn is_transient(&self) -> bool {
        match self {
            ApiError::ServerError { .. } => true,
            ApiError::NetworkError(err) => !err.is_builder() && !err.is_decode(),
            ApiError::Auth(_) | ApiError::ClientError { .. } | ApiError::InvalidResponse(_) => {
                false
            }
        }
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportRetry {
    max_attempts: u32,
    base_delay: Duration,
}

impl TransportRetry {
    /// Creates a policy making at most `max_attempts` calls (at least one)
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the failed attempt number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Executes `f` until it succeeds, fails non-transiently, or the attempt
    /// budget is spent
    pub async fn run<F, Fut, T, E>(&self, operation: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt + 1 < self.max_attempts && err.is_transient() => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for TransportRetry {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
