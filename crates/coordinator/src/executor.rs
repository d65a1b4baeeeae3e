//! Retry execution with backoff, per-attempt timeouts, and circuit breaking.

use crate::breaker::CircuitBreaker;
use hoist_core::retry::RetryPolicy;
use hoist_core::{Error, Result};
use std::future::Future;
use tracing::{debug, instrument, warn};

/// Runs remote operations under a [`RetryPolicy`].
///
/// The executor owns the circuit breaker shared by every operation it runs;
/// policies say whether (and how) a given operation class uses it. Every
/// attempt is gated by the breaker first, so a freshly opened circuit stops
/// retries mid-sequence instead of letting them hammer a down dependency.
pub struct RetryExecutor {
    breaker: CircuitBreaker,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self {
            breaker: CircuitBreaker::new(),
        }
    }

    /// The breaker shared by all operations run through this executor.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `run` until it succeeds, the policy's attempts are exhausted, or
    /// an error the policy does not retry shows up. The error from the final
    /// attempt is returned as-is.
    ///
    /// `run` is invoked once per attempt and must produce a fresh future
    /// each time.
    #[instrument(skip(self, policy, run))]
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        run: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let total = policy.total_tries();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(settings) = &policy.breaker {
                self.breaker.check(operation, settings)?;
            }

            match self.run_attempt(operation, policy, run()).await {
                Ok(value) => {
                    if let Some(settings) = &policy.breaker {
                        self.breaker.record_success(operation, settings);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if let Some(settings) = &policy.breaker {
                        self.breaker.record_failure(operation, settings);
                    }
                    if attempt >= total || !policy.should_retry(&err) {
                        if attempt > 1 {
                            warn!(
                                operation,
                                attempts = attempt,
                                error = %err,
                                "operation failed after retries"
                            );
                        }
                        return Err(err);
                    }
                    let delay = policy.delay_for(attempt - 1);
                    debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Run a single attempt, bounding the wait by the policy's timeout.
    ///
    /// A timed-out attempt keeps running on its own task; only the wait is
    /// abandoned. The breaker still counts the timeout as a failure.
    async fn run_attempt<T>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        fut: impl Future<Output = Result<T>> + Send + 'static,
    ) -> Result<T>
    where
        T: Send + 'static,
    {
        let Some(limit) = policy.timeout else {
            return fut.await;
        };

        let mut handle = tokio::spawn(fut);
        tokio::select! {
            biased;
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => Err(Error::Permanent(format!(
                    "operation '{operation}' panicked"
                ))),
                Err(_) => Err(Error::Transient(format!(
                    "operation '{operation}' was cancelled"
                ))),
            },
            _ = tokio::time::sleep(limit) => Err(Error::Timeout {
                operation: operation.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;
    use hoist_core::retry::{Backoff, BreakerSettings};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    fn quick_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
            backoff: Backoff::Fixed,
            max_delay: Duration::from_millis(5),
            timeout: None,
            jitter: None,
            breaker: None,
            retry_on: None,
        }
    }

    type BoxedAttempt<T, E> =
        std::pin::Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send>>;

    fn counting<T, E>(
        calls: &Arc<AtomicU32>,
        results: impl Fn(u32) -> std::result::Result<T, E> + Send + Sync + 'static,
    ) -> impl Fn() -> BoxedAttempt<T, E> + Send
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let calls = calls.clone();
        let results = Arc::new(results);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let results = results.clone();
            Box::pin(async move { results(n) })
        }
    }

    #[tokio::test]
    async fn test_first_success_needs_no_retry() {
        let executor = RetryExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));
        let run = counting(&calls, |_| Ok::<_, Error>(42));

        let value = executor.execute("op", &quick_policy(3), run).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let executor = RetryExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));
        let run = counting(&calls, |n| {
            if n < 2 {
                Err(Error::Transient("blip".into()))
            } else {
                Ok("done")
            }
        });

        let value = executor.execute("op", &quick_policy(3), run).await.unwrap();
        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let executor = RetryExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));
        let run = counting(&calls, |_| Err::<(), _>(Error::Validation("bad input".into())));

        let mut policy = quick_policy(3);
        policy.retry_on = Some(Error::is_retryable);

        let err = executor.execute("op", &policy, run).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let executor = RetryExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));
        let run = counting(&calls, |n| {
            Err::<(), _>(Error::Transient(format!("failure {n}")))
        });

        let err = executor.execute("op", &quick_policy(2), run).await.unwrap_err();
        assert_eq!(err.to_string(), "transient failure: failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_reports_but_does_not_cancel() {
        let executor = RetryExecutor::new();
        let finished = Arc::new(AtomicBool::new(false));

        let mut policy = quick_policy(0);
        policy.timeout = Some(Duration::from_millis(20));

        let flag = finished.clone();
        let err = executor
            .execute("slow-op", &policy, move || {
                let flag = flag.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok::<_, Error>(())
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { ref operation } if operation == "slow-op"));
        assert!(!finished.load(Ordering::SeqCst));

        // The attempt keeps running on its own task after the wait gave up.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_running() {
        let executor = RetryExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));

        let mut policy = quick_policy(0);
        policy.breaker = Some(BreakerSettings::new(2, Duration::from_secs(60)));

        for _ in 0..2 {
            let run = counting(&calls, |_| Err::<(), _>(Error::Transient("down".into())));
            let _ = executor.execute("flaky", &policy, run).await;
        }
        assert_eq!(executor.breaker().state("flaky"), BreakerState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let run = counting(&calls, |_| Ok::<_, Error>(()));
        let err = executor.execute("flaky", &policy, run).await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_breaker_trips_mid_retry_sequence() {
        let executor = RetryExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));

        // Threshold 2 with 3 retries budgeted: the third attempt is gated
        // off by the breaker the second failure opened.
        let mut policy = quick_policy(3);
        policy.breaker = Some(BreakerSettings::new(2, Duration::from_secs(60)));

        let run = counting(&calls, |_| Err::<(), _>(Error::Transient("down".into())));
        let err = executor.execute("flaky", &policy, run).await.unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_breaker_closes_after_successful_probes() {
        let executor = RetryExecutor::new();

        let mut settings = BreakerSettings::new(1, Duration::from_millis(30));
        settings.successes_to_close = 1;
        let mut policy = quick_policy(0);
        policy.breaker = Some(settings);

        let calls = Arc::new(AtomicU32::new(0));
        let run = counting(&calls, |_| Err::<(), _>(Error::Transient("down".into())));
        let _ = executor.execute("recovering", &policy, run).await;
        assert_eq!(executor.breaker().state("recovering"), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let run = counting(&calls, |_| Ok::<_, Error>(()));
        executor.execute("recovering", &policy, run).await.unwrap();
        assert_eq!(executor.breaker().state("recovering"), BreakerState::Closed);
    }
}
