//! Retry policy and executor

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::backoff::{BackoffCalculator, BackoffStrategy};

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    pub backoff_strategy: BackoffStrategy,

    /// Whether to add jitter to retry delays
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_strategy: BackoffStrategy::doubling(),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Doubling backoff starting at `initial_delay`
    pub fn doubling(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_strategy: BackoffStrategy::doubling(),
            jitter: false,
        }
    }

    /// Delay to wait after failed attempt number `attempt`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.calculator().calculate_delay(attempt)
    }

    pub fn calculator(&self) -> BackoffCalculator {
        BackoffCalculator::new(
            self.backoff_strategy.clone(),
            self.initial_delay,
            self.max_delay,
            self.jitter,
        )
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool;

    /// Whether the failure came from a timeout or an interrupted transfer
    fn is_transient(&self) -> bool {
        false
    }
}

/// What the retry loop observed on the way to a success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStats {
    /// Attempts made, the successful one included
    pub attempts: u32,

    /// Failed attempts that were retried
    pub transient_failures: u32,

    /// Time since the first attempt started
    pub elapsed: Duration,
}

/// Retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute with retry logic and report attempt statistics on success
    ///
    /// No delay follows the final attempt: once `max_attempts` failures have
    /// been seen the last error is returned straight away.
    pub async fn execute_with_stats<F, Fut, T, E>(
        &self,
        mut f: F,
    ) -> Result<(T, RetryStats), RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut transient_failures = 0;
        let mut attempt = 1;

        loop {
            debug!("Executing attempt {} of {}", attempt, max_attempts);

            match f(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    let stats = RetryStats {
                        attempts: attempt,
                        transient_failures,
                        elapsed: started.elapsed(),
                    };
                    return Ok((value, stats));
                }
                Err(error) => {
                    if !error.is_retryable() {
                        warn!("Operation failed with non-retryable error: {}", error);
                        return Err(RetryError::NonRetryableError(error));
                    }

                    if attempt >= max_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, error);
                        return Err(RetryError::MaxAttemptsExceeded {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);

                    warn!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, delay
                    );
                    sleep(delay).await;

                    transient_failures += 1;
                    attempt += 1;
                }
            }
        }
    }
}

/// Retry error types
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    /// Non-retryable error encountered
    #[error("Non-retryable error: {0}")]
    NonRetryableError(E),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct TestError {
        retryable: bool,
        message: String,
    }

    impl TestError {
        fn transient(message: &str) -> Self {
            Self {
                retryable: true,
                message: message.to_string(),
            }
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }

        fn is_transient(&self) -> bool {
            self.retryable
        }
    }

    fn fetch_policy() -> RetryPolicy {
        RetryPolicy::doubling(5, Duration::from_millis(200), Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let executor = RetryExecutor::new(fetch_policy());

        let (value, stats) = executor
            .execute_with_stats(|_attempt| {
                let count = counter_clone.fetch_add(1, Ordering::Relaxed);
                async move {
                    if count < 3 {
                        Err(TestError::transient("read timed out"))
                    } else {
                        Ok("payload".to_string())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "payload");
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.transient_failures, 3);
        assert_eq!(counter.load(Ordering::Relaxed), 4);
        // 200 + 400 + 800
        assert!(stats.elapsed >= Duration::from_millis(1400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_double_between_attempts() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let starts_clone = starts.clone();
        let executor = RetryExecutor::new(fetch_policy());

        let result: Result<((), RetryStats), RetryError<TestError>> = executor
            .execute_with_stats(|_attempt| {
                starts_clone.lock().unwrap().push(Instant::now());
                async { Err(TestError::transient("connection reset")) }
            })
            .await;
        assert!(result.is_err());

        let starts = starts.lock().unwrap();
        let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 4);
        assert!(gaps[0] >= Duration::from_millis(200));
        for pair in gaps.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_max_attempts_without_trailing_sleep() {
        let executor = RetryExecutor::new(fetch_policy());
        let started = Instant::now();

        let result: Result<((), RetryStats), RetryError<TestError>> = executor
            .execute_with_stats(|_attempt| async { Err(TestError::transient("always times out")) })
            .await;

        match result {
            Err(RetryError::MaxAttemptsExceeded { attempts, last_error }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last_error.message, "always times out");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        // 200 + 400 + 800 + 1600, nothing after the fifth attempt
        assert!(started.elapsed() < Duration::from_millis(3200));
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let executor = RetryExecutor::new(RetryPolicy::default());

        let result: Result<((), RetryStats), RetryError<TestError>> = executor
            .execute_with_stats(|_attempt| {
                counter_clone.fetch_add(1, Ordering::Relaxed);
                async {
                    Err(TestError {
                        retryable: false,
                        message: "corrupt document".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(RetryError::NonRetryableError(_))));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_attempt_number_is_passed_to_operation() {
        let executor = RetryExecutor::new(RetryPolicy::doubling(
            3,
            Duration::from_millis(1),
            Duration::from_millis(10),
        ));

        let result = executor
            .execute_with_stats(|attempt| async move {
                if attempt < 3 {
                    Err(TestError::transient(&format!("Attempt {}", attempt)))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        let (value, stats) = result.unwrap();
        assert_eq!(value, 3);
        assert_eq!(stats.transient_failures, 2);
    }

    #[test]
    fn test_policy_from_yaml_like_json() {
        let policy: RetryPolicy = serde_json::from_str(
            r#"{
                "max_attempts": 5,
                "initial_delay": "200ms",
                "max_delay": "30s",
                "backoff_strategy": {"type": "exponential", "base": 2.0}
            }"#,
        )
        .unwrap();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(200));
        assert!(!policy.jitter);
    }
}
