//! Bounded retry and polling helpers.
//!
//! Provider calls are retried only when they fail with a retryable error
//! (transient or timeout). Polling for a condition is bounded by the same
//! policy shape and ends in a timeout failure instead of waiting forever.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::{ProviderError, ProviderResult};

/// Retry policy for provider calls and polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Policy for waiting on an instance: 40 polls, 2s growing to 15s
    pub fn instance_wait() -> Self {
        Self {
            max_attempts: 40,
            initial_delay_ms: 2000,
            max_delay_ms: 15000,
            backoff_multiplier: 1.5,
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Upper bound on the time spent sleeping between attempts
    pub fn max_total_delay(&self) -> Duration {
        (1..self.max_attempts.max(1))
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }
}

/// Run `op`, retrying retryable failures according to `policy`
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    call = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Result of one check while polling
#[derive(Debug, Clone, PartialEq)]
pub enum Poll<T> {
    /// The awaited condition holds
    Ready(T),

    /// Not there yet; carries the observed state for diagnostics
    NotYet(String),
}

/// Poll `check` until it reports `Ready`, at most `policy.max_attempts` times.
///
/// Retryable check errors count as attempts; other errors end the wait.
pub async fn poll_until<T, F, Fut>(policy: &RetryPolicy, what: &str, mut check: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<Poll<T>>>,
{
    let mut attempt = 0u32;
    let mut last_seen = String::from("unknown");

    loop {
        attempt += 1;

        match check().await {
            Ok(Poll::Ready(value)) => return Ok(value),
            Ok(Poll::NotYet(observed)) => {
                debug!(wait = what, attempt, %observed, "Condition not met yet");
                last_seen = observed;
            }
            Err(e) if e.is_retryable() => {
                warn!(wait = what, attempt, error = %e, "Check failed, will poll again");
                last_seen = e.to_string();
            }
            Err(e) => return Err(e),
        }

        if !policy.should_retry(attempt) {
            return Err(ProviderError::Timeout(format!(
                "{} not reached after {} polls (last seen: {})",
                what, attempt, last_seen
            )));
        }

        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
    }
}
