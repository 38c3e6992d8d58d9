//! In-process gateway with a scriptable answer queue per operation.
//!
//! With nothing scripted every call succeeds, which makes it usable for local
//! runs (`GATEWAY_KIND=mock`). Tests push steps to drive failures, latency,
//! and hung calls.

use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::provider::{IntentRequest, IntentResponse, PaymentGateway, RefundResponse};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    CreateIntent,
    Capture,
    Cancel,
    Refund,
}

#[derive(Debug, Clone)]
pub enum MockStep {
    Succeed,
    Fail(GatewayError),
    /// Sleeps, then succeeds.
    Delay(Duration),
    /// Never answers.
    Hang,
}

#[derive(Default)]
struct MockState {
    script: HashMap<MockOperation, VecDeque<MockStep>>,
    calls: HashMap<MockOperation, usize>,
    create_requests: Vec<IntentRequest>,
    intents_by_key: HashMap<String, String>,
}

#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
    sequence: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues `step` as the next answer for `operation`.
    pub fn push(&self, operation: MockOperation, step: MockStep) -> &Self {
        self.lock()
            .script
            .entry(operation)
            .or_default()
            .push_back(step);
        self
    }

    pub fn push_failures(&self, operation: MockOperation, error: GatewayError, times: usize) -> &Self {
        for _ in 0..times {
            self.push(operation, MockStep::Fail(error.clone()));
        }
        self
    }

    pub fn calls(&self, operation: MockOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn create_requests(&self) -> Vec<IntentRequest> {
        self.lock().create_requests.clone()
    }

    fn next_step(&self, operation: MockOperation) -> MockStep {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        state
            .script
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(MockStep::Succeed)
    }

    async fn play(&self, operation: MockOperation) -> GatewayResult<()> {
        match self.next_step(operation) {
            MockStep::Succeed => Ok(()),
            MockStep::Fail(err) => Err(err),
            MockStep::Delay(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            MockStep::Hang => std::future::pending().await,
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_mock_{}", prefix, self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(&self, request: &IntentRequest) -> GatewayResult<IntentResponse> {
        self.lock().create_requests.push(request.clone());
        self.play(MockOperation::CreateIntent).await?;

        let id = match &request.idempotency_key {
            Some(key) => {
                let fresh = self.next_id("pi");
                self.lock()
                    .intents_by_key
                    .entry(key.clone())
                    .or_insert(fresh)
                    .clone()
            }
            None => self.next_id("pi"),
        };

        Ok(IntentResponse {
            id,
            status: "requires_capture".to_string(),
            amount: Some(request.amount),
        })
    }

    async fn capture(&self, intent_id: &str) -> GatewayResult<IntentResponse> {
        self.play(MockOperation::Capture).await?;
        Ok(IntentResponse {
            id: intent_id.to_string(),
            status: "succeeded".to_string(),
            amount: None,
        })
    }

    async fn cancel(&self, intent_id: &str) -> GatewayResult<IntentResponse> {
        self.play(MockOperation::Cancel).await?;
        Ok(IntentResponse {
            id: intent_id.to_string(),
            status: "canceled".to_string(),
            amount: None,
        })
    }

    async fn refund(&self, intent_id: &str, amount: i64) -> GatewayResult<RefundResponse> {
        self.play(MockOperation::Refund).await?;
        Ok(RefundResponse {
            id: self.next_id("re"),
            intent_id: intent_id.to_string(),
            status: "succeeded".to_string(),
            amount,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
