//! Bounded retry with a fixed delay.
//!
//! Upload and download share this loop so both follow the same policy:
//! a fixed number of attempts, a constant pause between them, no growth and
//! no jitter. Every failure is retried.

use crate::config::TransferConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,

    /// Pause between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.attempts, config.retry_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Every attempt failed; `last` is the final attempt's error.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `attempt` until it succeeds or the policy's attempts are used up.
///
/// `attempt` receives the 1-based attempt number and is expected to log its
/// own failure. The delay is slept between attempts only, never after the
/// last one.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts.max(1);
    let mut number = 1;

    loop {
        match attempt(number).await {
            Ok(value) => {
                if number > 1 {
                    info!("{} succeeded on attempt {}/{}", operation, number, attempts);
                }
                return Ok(value);
            }
            Err(e) if number >= attempts => {
                error!("{} failed after {} attempts: {}", operation, number, e);
                return Err(Exhausted {
                    attempts: number,
                    last: e,
                });
            }
            Err(_) => {
                debug!(
                    "{} attempt {}/{} failed; retrying in {}s",
                    operation,
                    number,
                    attempts,
                    policy.delay.as_secs()
                );
                tokio::time::sleep(policy.delay).await;
                number += 1;
            }
        }
    }
}
