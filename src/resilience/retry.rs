use crate::error::{AnalysisError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const MAX_JITTER_MS: u64 = 250;

/// Retry budget for one upstream fetch
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: u32,
    /// Base delay doubled on each retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt count and base delay
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// Runs `op` with exponential backoff and jitter, retrying transient errors
/// only
///
/// Permanent failures (4xx, parse errors, validation) return immediately:
/// repeating them wastes the budget and hides the real problem.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !e.is_transient() {
                    return Err(e);
                }
                let backoff = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                let jitter =
                    Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS));
                debug!(
                    "retrying after transient error (attempt {}/{}): {}",
                    attempt, policy.max_attempts, e
                );
                sleep(backoff + jitter).await;
            }
        }
    }
}
