//! Retry with exponential backoff around any [`Invoker`].

use std::time::Duration;

use async_trait::async_trait;
use petstore_core::{ClientConfig, InvocationResult};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::invoker::Invoker;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each retry after it.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy from the client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay())
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Retries transient transport failures of the wrapped invoker.
///
/// Only `ConnectionLost`, `Timeout` and server-side remote errors are
/// retried. A tool that reports its own failure is a completed call and is
/// returned as-is.
pub struct Retrying<I> {
    inner: I,
    policy: RetryPolicy,
}

impl<I> Retrying<I> {
    pub fn new(inner: I, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

#[async_trait]
impl<I: Invoker> Invoker for Retrying<I> {
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<InvocationResult, TransportError> {
        let attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            let error = match self.inner.invoke(tool, arguments.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if !error.is_transient() {
                debug!(tool = tool, error = %error, "Not retrying permanent failure");
                return Err(error);
            }

            if attempt >= attempts {
                warn!(tool = tool, attempts = attempts, error = %error, "Giving up after retries");
                return Err(error);
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                tool = tool,
                attempt = attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Tool call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Replays scripted outcomes and records when each call happened.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<InvocationResult, TransportError>>>,
        calls: Arc<Mutex<Vec<Instant>>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<InvocationResult, TransportError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Invoker for Scripted {
        async fn invoke(&self, _tool: &str, _arguments: Value) -> Result<InvocationResult, TransportError> {
            self.calls.lock().push(Instant::now());
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::connection_lost("script exhausted")))
        }
    }

    fn ok() -> Result<InvocationResult, TransportError> {
        Ok(InvocationResult::success(Value::Null, "ok"))
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(500));
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_policy_from_out_of_range_delay_is_clamped() {
        let config = ClientConfig::default().with_retry(3, 1e20);
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(
            policy.delay_after(1),
            Duration::from_secs_f64(petstore_core::config::MAX_RETRY_DELAY_SECS)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_timeouts_with_backoff() {
        let base = Duration::from_secs(1);
        let inner = Scripted::new(vec![
            Err(TransportError::Timeout(Duration::from_secs(30))),
            Err(TransportError::Timeout(Duration::from_secs(30))),
            ok(),
        ]);
        let calls = Arc::clone(&inner.calls);
        let retrying = Retrying::new(inner, RetryPolicy::new(3, base));

        let result = retrying.invoke("get_inventory", Value::Null).await.unwrap();
        assert!(result.is_success());

        let calls = calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], base);
        assert_eq!(calls[2] - calls[1], base * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_violation_is_not_retried() {
        let inner = Scripted::new(vec![Err(TransportError::protocol("unknown tool 'x'")), ok()]);
        let calls = Arc::clone(&inner.calls);
        let retrying = Retrying::new(inner, RetryPolicy::new(3, Duration::from_secs(1)));

        let result = retrying.invoke("x", Value::Null).await;
        assert!(matches!(result, Err(TransportError::ProtocolViolation(_))));
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_error_returned_after_exhaustion() {
        let inner = Scripted::new(vec![
            Err(TransportError::connection_lost("first")),
            Err(TransportError::remote(503, "unavailable")),
        ]);
        let calls = Arc::clone(&inner.calls);
        let retrying = Retrying::new(inner, RetryPolicy::new(2, Duration::from_millis(10)));

        let result = retrying.invoke("get_inventory", Value::Null).await;
        assert!(matches!(result, Err(TransportError::RemoteError { code: 503, .. })));
        assert_eq!(calls.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_makes_one_call() {
        let inner = Scripted::new(vec![Err(TransportError::connection_lost("eof"))]);
        let calls = Arc::clone(&inner.calls);
        let retrying = Retrying::new(inner, RetryPolicy::new(0, Duration::from_secs(1)));

        assert!(retrying.invoke("get_inventory", Value::Null).await.is_err());
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_failure_is_not_retried() {
        let failure = InvocationResult::failure(
            petstore_core::ErrorDescriptor::new("tool_error", "Pet not found"),
            "Pet not found",
        );
        let inner = Scripted::new(vec![Ok(failure)]);
        let calls = Arc::clone(&inner.calls);
        let retrying = Retrying::new(inner, RetryPolicy::default());

        let result = retrying.invoke("get_pet_by_id", Value::Null).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(calls.lock().len(), 1);
    }
}
