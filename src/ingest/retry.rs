// src/ingest/retry.rs
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded retries with linear backoff (`base_delay * attempt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

/// Run `op` until it succeeds or the policy is exhausted; returns the last error.
/// `op` receives the 1-based attempt number.
pub async fn with_retries<T, E, F, Fut>(policy: &RetryPolicy, what: &str, op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    with_retries_when(policy, what, |_| true, op).await
}

/// Like [`with_retries`], but errors for which `retryable` is false are
/// returned at once.
pub async fn with_retries_when<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    what: &str,
    retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let attempts = policy.attempts();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts && retryable(&e) => {
                tracing::warn!(
                    target: "retry",
                    what,
                    attempt,
                    attempts,
                    error = %e,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
