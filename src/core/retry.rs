// src/core/retry.rs — Bounded retry with a fixed delay
//
// Every fallible upstream call goes through `retry`: up to three attempts,
// a fixed sleep between them, and an `Exhausted` error carrying the last
// failure. Callers decide how severe exhaustion is.

use std::future::Future;
use std::time::Duration;

use crate::infra::errors::VaultError;

/// Attempts made before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_delay(Duration::from_secs(10))
    }
}

/// Run `f` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// Sleeps `policy.delay` between attempts, never after the last one.
pub async fn retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, VaultError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VaultError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                return Err(VaultError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    "{} failed, retrying: {}",
                    operation,
                    e
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
