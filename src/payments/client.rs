//! Resilient front for a [`PaymentGateway`] transport.
//!
//! Every call goes through the circuit breaker and races the caller's
//! [`RequestContext`]. Intent creation additionally retries transient failures
//! with exponential backoff inside a single breaker slot.

use crate::context::RequestContext;
use crate::payments::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::provider::{IntentRequest, IntentResponse, PaymentGateway, RefundResponse};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2,
        }
    }
}

#[derive(Clone)]
pub struct GatewayClient {
    transport: Arc<dyn PaymentGateway>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl GatewayClient {
    pub fn new(
        transport: Arc<dyn PaymentGateway>,
        breaker_config: CircuitBreakerConfig,
        retry: RetryPolicy,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(transport.name(), breaker_config));
        Self {
            transport,
            breaker,
            retry,
        }
    }

    pub fn name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    pub async fn create_intent(
        &self,
        ctx: &RequestContext,
        request: &IntentRequest,
    ) -> GatewayResult<IntentResponse> {
        self.guarded(ctx, "create_intent", self.create_with_retry(ctx, request))
            .await
    }

    pub async fn capture(
        &self,
        ctx: &RequestContext,
        intent_id: &str,
    ) -> GatewayResult<IntentResponse> {
        self.guarded(ctx, "capture", self.transport.capture(intent_id))
            .await
    }

    pub async fn cancel(&self, ctx: &RequestContext, intent_id: &str) -> GatewayResult<IntentResponse> {
        self.guarded(ctx, "cancel", self.transport.cancel(intent_id))
            .await
    }

    pub async fn refund(
        &self,
        ctx: &RequestContext,
        intent_id: &str,
        amount: i64,
    ) -> GatewayResult<RefundResponse> {
        self.guarded(ctx, "refund", self.transport.refund(intent_id, amount))
            .await
    }

    async fn guarded<T, F>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        call: F,
    ) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        if let Some(reason) = ctx.interrupted() {
            return Err(GatewayError::Cancelled { reason });
        }

        let result = self
            .breaker
            .call(async {
                match ctx.run(call).await {
                    Ok(result) => result,
                    Err(reason) => Err(GatewayError::Cancelled { reason }),
                }
            })
            .await;

        match &result {
            Ok(_) => debug!(gateway = self.name(), operation, "gateway call succeeded"),
            Err(e) => warn!(
                gateway = self.name(),
                operation,
                error = %e,
                "gateway call failed"
            ),
        }
        result
    }

    async fn create_with_retry(
        &self,
        ctx: &RequestContext,
        request: &IntentRequest,
    ) -> GatewayResult<IntentResponse> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.transport.create_intent(request).await {
                Ok(intent) => return Ok(intent),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        payment_id = %request.payment_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "gateway create_intent failed, retrying"
                    );
                    ctx.sleep(backoff)
                        .await
                        .map_err(|reason| GatewayError::Cancelled { reason })?;
                    backoff = backoff.saturating_mul(self.retry.multiplier);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
