//! Fixed-delay retry.
//!
//! # Responsibilities
//! - Run an async operation up to a fixed number of attempts
//! - Pause for a fixed delay between attempts
//!
//! # Design Decisions
//! - No backoff or jitter: the only caller is the daemon connect of a
//!   reconciliation tick, which is itself retried every interval
//! - No pause after the final attempt; the error is returned immediately

use std::future::Future;
use std::time::Duration;
use tokio::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up,
/// returning the last error.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                tracing::error!(what, attempt, error = %e, "Giving up");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(what, attempt, max_attempts = attempts, error = %e, "Attempt failed, retrying");
                time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
