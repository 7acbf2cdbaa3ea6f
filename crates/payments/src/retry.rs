//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::PaymentError;

/// How often and how long to retry a failing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: u32,
    /// Delay before the first retry; doubles for every further retry.
    pub base_delay: Duration,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    /// Three retries after 1s, 2s and 4s, each attempt capped at 5s.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(retry - 1))
    }

    /// Runs `operation` until it succeeds, fails permanently, or runs out of
    /// retries. Each attempt is bounded by `attempt_timeout`.
    ///
    /// Only [transient](PaymentError::is_transient) errors are retried. When
    /// retries run out the last error is wrapped in
    /// [`PaymentError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, PaymentError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PaymentError>>,
    {
        self.run_if(PaymentError::is_transient, operation).await
    }

    /// Like [`run`](Self::run), but retries every error `should_retry` accepts.
    pub async fn run_if<T, F, Fut, P>(
        &self,
        should_retry: P,
        mut operation: F,
    ) -> Result<T, PaymentError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PaymentError>>,
        P: Fn(&PaymentError) -> bool,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, operation(attempt)).await
            {
                Ok(result) => result,
                Err(_) => Err(PaymentError::Timeout(self.attempt_timeout)),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) if !should_retry(&err) => return Err(err),
                Err(err) => err,
            };

            tracing::warn!(attempt, error = %err, "attempt failed");
            if attempt > self.max_retries {
                return Err(PaymentError::RetriesExhausted {
                    attempts: attempt,
                    last_error: Box::new(err),
                });
            }

            metrics::counter!("payment_retries_total").increment(1);
            tokio::time::sleep(self.delay_for_retry(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use store::StoreError;

    use super::*;

    fn conflict() -> PaymentError {
        PaymentError::Store(StoreError::Conflict("could not serialize access".into()))
    }

    #[test]
    fn test_default_delays_are_1_2_4_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for_retry(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = RetryPolicy::default()
            .run(|_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(conflict())
                    } else {
                        Ok("settled")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "settled");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = RetryPolicy::default()
            .run(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(conflict())
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = RetryPolicy::default()
            .run(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PaymentError::UnknownTransaction("tx".into()))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::UnknownTransaction(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_if_retries_what_the_predicate_accepts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = RetryPolicy::default()
            .run_if(
                |_| true,
                |_| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(PaymentError::UnknownTransaction("tx".into()))
                    }
                },
            )
            .await
            .unwrap_err();

        match err {
            PaymentError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last_error, PaymentError::UnknownTransaction(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_time_out() {
        let policy = RetryPolicy::no_retry().with_attempt_timeout(Duration::from_millis(50));

        let err = policy
            .run(|_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        match err {
            PaymentError::RetriesExhausted { last_error, .. } => {
                assert!(matches!(*last_error, PaymentError::Timeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
