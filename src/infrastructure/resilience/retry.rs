//! Retry with exponential backoff and jitter
//!
//! Wraps a provider call with the breaker gate, a per-call timeout, and a
//! bounded retry loop. Only retriable error kinds are retried; fatal kinds
//! and open circuits propagate immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::domain::error::{Error, Result};
use crate::infrastructure::resilience::CircuitBreaker;

/// Backoff tuning for retriable failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for the given attempt, with up to 50% jitter
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_cap = (exp.as_millis() as u64 / 2).max(1);
        let jitter = rand::rng().random_range(0..jitter_cap);
        exp + Duration::from_millis(jitter)
    }
}

/// Run `op` through the breaker gate with a timeout and bounded retries.
///
/// Timeouts count as transient provider failures. Every failure, including
/// a timeout, is recorded against the breaker; a success closes it.
pub async fn call_with_retry<T, F, Fut>(
    provider: &str,
    breaker: &CircuitBreaker,
    policy: &RetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        breaker.check()?;

        let outcome = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(Error::provider_unavailable(
                provider,
                format!("call timed out after {}s", timeout.as_secs()),
            )),
        };

        match outcome {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(err) => {
                breaker.record_failure();
                if err.is_retriable() && attempt < policy.max_retries {
                    let delay = policy.delay_for(attempt);
                    tracing::debug!(
                        provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "retrying provider call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::resilience::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 10,
                cooldown: Duration::from_millis(10),
            },
        )
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);
        let breaker = breaker();
        let result = call_with_retry(
            "test",
            &breaker,
            &fast_policy(),
            Duration::from_secs(1),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::provider_unavailable("test", "flaky"))
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let breaker = breaker();
        let result: Result<()> = call_with_retry(
            "test",
            &breaker,
            &fast_policy(),
            Duration::from_secs(1),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::provider_fatal("test", "bad credentials")) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn an_open_circuit_fails_fast_without_calling() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
            },
        );
        breaker.record_failure();

        let calls = AtomicU32::new(0);
        let result: Result<()> = call_with_retry(
            "test",
            &breaker,
            &fast_policy(),
            Duration::from_secs(1),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timeouts_count_as_transient_failures() {
        let calls = AtomicU32::new(0);
        let breaker = breaker();
        let result: Result<()> = call_with_retry(
            "test",
            &breaker,
            &RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            Duration::from_millis(10),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
