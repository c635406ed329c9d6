//! Retry policy and retrying executor

use super::{ExecutionError, Fill, OrderExecutor, OrderId, OrderRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier,
        }
    }

    /// Back-to-back attempts with no delay
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1)
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2)
    }
}

/// Wraps an executor with a per-attempt timeout and a retry policy
#[derive(Clone)]
pub struct RetryingExecutor {
    inner: Arc<dyn OrderExecutor>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RetryingExecutor {
    pub fn new(inner: Arc<dyn OrderExecutor>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Place an order under an explicit policy
    ///
    /// A timed-out attempt counts as a failure, never as a fill.
    pub async fn place_with(
        &self,
        request: &OrderRequest,
        policy: &RetryPolicy,
    ) -> Result<Fill, ExecutionError> {
        let mut last = None;

        for attempt in 1..=policy.max_attempts {
            let result = match tokio::time::timeout(self.timeout, self.inner.place(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ExecutionError::Timeout(self.timeout)),
            };

            match result {
                Ok(fill) => {
                    if attempt > 1 {
                        tracing::info!(
                            order = %request.client_order_id,
                            attempt,
                            "Order filled after retry"
                        );
                    }
                    return Ok(fill);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        order = %request.client_order_id,
                        market = %request.market,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Order attempt failed"
                    );
                    last = Some(e);
                }
            }

            if attempt < policy.max_attempts {
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(ExecutionError::RetriesExhausted {
            attempts: policy.max_attempts,
            last: Box::new(last.unwrap_or(ExecutionError::Timeout(self.timeout))),
        })
    }
}

#[async_trait]
impl OrderExecutor for RetryingExecutor {
    async fn place(&self, request: &OrderRequest) -> Result<Fill, ExecutionError> {
        self.place_with(request, &self.policy).await
    }

    async fn cancel(&self, order_id: OrderId) -> Result<bool, ExecutionError> {
        match tokio::time::timeout(self.timeout, self.inner.cancel(order_id)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.timeout)),
        }
    }
}
