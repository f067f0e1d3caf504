//! Retry coordinator: bounded exponential backoff with jitter around a
//! single operation.
//!
//! Adapted from the backoff math in the teacher's `rpc::error::with_retry`
//! and `rpc::stellar::retry_request`, but deliberately does NOT wrap a
//! circuit breaker call the way the teacher's version does — this
//! coordinator only retries a bare future. The dispatcher composes
//! `breaker.execute(|| retry.run(call))`, so the breaker only ever sees the
//! outcome of a complete retry sequence, never an individual attempt.

use rand::Rng;
use std::time::Duration;

use crate::config::RetrySettings;
use crate::error::{retry_exhausted, AppError};

pub struct RetryCoordinator {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_fraction: f64,
}

impl RetryCoordinator {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.base_delay,
            max_delay: settings.max_delay,
            multiplier: settings.multiplier,
            jitter_fraction: settings.jitter_fraction,
        }
    }

    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = self.multiplier.powi(attempt as i32 - 1);
        let base_ms = self.base_delay.as_millis() as f64 * exponent;
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);

        let jitter_span = capped_ms * self.jitter_fraction;
        let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
        let with_jitter = (capped_ms + jitter).max(0.0);

        Duration::from_millis(with_jitter as u64)
    }

    /// Runs `f` up to `max_retries + 1` times. Only `AppError::is_retryable`
    /// errors are retried; anything else (validation, permanent, breaker
    /// rejections that somehow leak in here) is returned immediately.
    pub async fn run<F, Fut, T>(&self, mut f: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let started = std::time::Instant::now();
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt <= self.max_retries => {
                    let delay = self.backoff_for_attempt(attempt);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(retry_exhausted(err, attempt, started.elapsed()));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn coordinator() -> RetryCoordinator {
        RetryCoordinator::new(&RetrySettings {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
            jitter_fraction: 0.1,
        })
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = coordinator()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, AppError>(()) }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_the_limit() {
        let calls = AtomicU32::new(0);
        let result = coordinator()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::Transient("down".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result = coordinator()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::Permanent { status: 422, message: "bad".into() }) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
