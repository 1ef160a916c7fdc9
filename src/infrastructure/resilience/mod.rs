//! Resilience patterns for provider calls
//!
//! Every external provider call goes through a per-provider circuit
//! breaker and a retry policy with exponential backoff and jitter.
//! Retries apply to retriable error kinds only; an open circuit fails
//! fast with a distinct error kind.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
pub use retry::{call_with_retry, RetryPolicy};
