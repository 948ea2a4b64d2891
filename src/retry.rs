//! Bounded retry with exponential backoff and additive jitter.
//!
//! The policy wraps any fallible async operation. It is used unchanged for the
//! single `getPlantName` read and for the batched multicall.

use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::Retry;
use tracing::{error, warn};

use crate::metrics;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_JITTER: Duration = Duration::from_secs(1);

/// Returned once every attempt has failed.
#[derive(Debug, thiserror::Error)]
#[error("{label} failed after {attempts} attempts: {source}")]
pub struct RetryError {
    /// Operation kind, e.g. `getPlantName` or `aggregate3`.
    pub kind: &'static str,
    pub label: String,
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter,
        }
    }

    /// A policy that tries exactly once.
    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after the 0-indexed failed `attempt`:
    /// `base_delay * 2^attempt + uniform(0, jitter)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        backoff.saturating_add(jitter)
    }

    /// Runs `operation` until it succeeds or the attempt budget is spent.
    ///
    /// `kind` is the metric label and must come from a fixed set; `label` is
    /// free-form and only appears in logs. Every failed attempt that will be
    /// retried logs a warning with the delay before the next one; exhaustion
    /// logs an error and returns the last failure wrapped in [`RetryError`].
    pub async fn run<T, F, Fut>(
        &self,
        kind: &'static str,
        label: &str,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let total = self.total_attempts();
        // Drawn up front so the logged delay is the one tokio-retry sleeps for.
        let delays: Vec<Duration> = (0..self.max_retries).map(|a| self.delay(a)).collect();
        let attempt = AtomicU32::new(0);

        let result = Retry::spawn(delays.clone(), || {
            let n = attempt.fetch_add(1, Ordering::Relaxed);
            let fut = operation();
            let next_delay = delays.get(n as usize).copied();
            async move {
                fut.await.map_err(|e| {
                    if let Some(delay) = next_delay {
                        metrics::increment_retry(kind);
                        warn!(
                            kind,
                            label,
                            attempt = n + 1,
                            total,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "{} failed (attempt {}/{}), retrying in {:?}",
                            label,
                            n + 1,
                            total,
                            delay
                        );
                    }
                    e
                })
            }
        })
        .await;

        result.map_err(|source| {
            let attempts = attempt.load(Ordering::Relaxed);
            error!(label, attempts, error = %source, "{} failed after {} attempts", label, attempts);
            RetryError {
                kind,
                label: label.to_string(),
                attempts,
                source,
            }
        })
    }
}
