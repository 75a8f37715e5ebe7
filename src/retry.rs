//! Bounded retry for optimistic-concurrency conflicts
//!
//! Only write conflicts (HTTP 409) are retried here; every other error is
//! returned immediately and left to the controller's requeue policy.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::Result;

/// Backoff settings for conflict retries
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-conflict error, or
/// the attempt budget is spent
///
/// Each attempt should re-read the live object, so a retry works against
/// the latest resourceVersion.
pub async fn retry_on_conflict<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_conflict() => return Err(e),
            Err(e) if attempt >= config.max_attempts => {
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    "Conflict persisted after max retries"
                );
                return Err(e);
            }
            Err(e) => {
                // 0.5x to 1.5x of the nominal delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                debug!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Write conflict, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}
