//! Upload retry policy
//!
//! Server and transport failures during upload are retried forever. The delay
//! before retry `n` follows the configured schedule for the first
//! `delays.len()` retries; after that the last delay repeats.

use std::time::Duration;

use super::errors::DomainError;

/// Ordered list of backoff delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// Creates a policy from a non-empty delay schedule
    ///
    /// # Errors
    /// Returns `DomainError::EmptyRetryPolicy` if `delays` is empty
    pub fn new(delays: Vec<Duration>) -> Result<Self, DomainError> {
        if delays.is_empty() {
            return Err(DomainError::EmptyRetryPolicy);
        }
        Ok(Self { delays })
    }

    /// Builds a policy from millisecond values as stored in the config file
    pub fn from_millis(delays_ms: &[u64]) -> Result<Self, DomainError> {
        Self::new(delays_ms.iter().copied().map(Duration::from_millis).collect())
    }

    /// Delay to wait before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.delays.len() - 1);
        self.delays[idx]
    }

    /// The configured schedule
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(8),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
        }
    }
}
