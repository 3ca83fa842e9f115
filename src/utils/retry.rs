//! Bounded exponential backoff for remote store calls

use super::drive_ops::Result;
use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delays between attempts: doubles from `initial` up to `max`, and yields
/// one delay fewer than the number of attempts allowed
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    next_delay: Duration,
    max_delay: Duration,
    remaining: u32,
}

impl ExponentialBackoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            next_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            remaining: config.max_attempts.saturating_sub(1),
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = self.next_delay.min(self.max_delay);
        self.next_delay = self.next_delay.saturating_mul(2);
        Some(delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempts in `config` are used up. The last error is returned.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = ExponentialBackoff::new(config);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => match backoff.next() {
                Some(delay) => {
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        what, attempt, config.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}
