//! Exponential backoff retrier.
//!
//! Attempt 1 runs immediately; attempt `k >= 2` waits
//! `initial_delay * 2^(k-2)`. There is no jitter. An optional cap
//! ([`RetryConfig::max_delay`]) bounds a single delay.

use crate::config::RetryConfig;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Retrier {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Option<Duration>,
}

impl Retrier {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before 1-based `attempt`. Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(31);
        let delay = self
            .initial_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` tries are spent.
    ///
    /// Non-retryable errors (4xx, serialization, policy) are returned as-is.
    /// Exhaustion is reported as [`Error::RetryExhausted`] wrapping the last error.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with_hook(op, |_, _, _| {}).await
    }

    /// Like [`Retrier::run`], calling `on_retry(next_attempt, delay, &err)`
    /// before each backoff sleep.
    pub async fn run_with_hook<T, F, Fut, H>(&self, mut op: F, mut on_retry: H) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        H: FnMut(u32, Duration, &Error),
    {
        let mut attempt = 1;
        loop {
            let err = match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };

            if !err.is_retryable() {
                debug!(attempt, error = %err, "not retrying non-retryable error");
                return Err(err);
            }
            if attempt >= self.max_attempts {
                return Err(Error::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let next = attempt + 1;
            let delay = self.delay_before(next);
            debug!(attempt = next, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
            on_retry(next, delay, &err);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retrier(max_attempts: u32) -> Retrier {
        Retrier::new(
            &RetryConfig::default()
                .with_max_attempts(max_attempts)
                .with_initial_delay(Duration::from_millis(1)),
        )
    }

    fn server_error() -> Error {
        Error::Status {
            status: 500,
            body: "boom".into(),
        }
    }

    #[test]
    fn delays_double_from_second_attempt() {
        let r = Retrier::new(
            &RetryConfig::default().with_initial_delay(Duration::from_millis(100)),
        );
        assert_eq!(r.delay_before(1), Duration::ZERO);
        assert_eq!(r.delay_before(2), Duration::from_millis(100));
        assert_eq!(r.delay_before(3), Duration::from_millis(200));
        assert_eq!(r.delay_before(4), Duration::from_millis(400));
    }

    #[test]
    fn cap_bounds_delay() {
        let r = Retrier::new(
            &RetryConfig::default()
                .with_initial_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(250)),
        );
        assert_eq!(r.delay_before(5), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn never_exceeds_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retrier(3)
            .run(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(server_error())
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            Error::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.status(), Some(500));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn client_error_stops_after_first_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retrier(5)
            .run(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Status {
                    status: 422,
                    body: "bad".into(),
                })
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.is_client_error());
        assert!(!err.is_retry_exhausted());
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let mut hooks = Vec::new();
        let v = retrier(3)
            .run_with_hook(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 {
                            Err(server_error())
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |next, delay, _| hooks.push((next, delay)),
            )
            .await
            .unwrap();
        assert_eq!(v, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(hooks, vec![(2, Duration::from_millis(1))]);
    }
}
