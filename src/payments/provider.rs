use crate::payments::error::GatewayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Authorization request sent to the gateway for a new payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntentRequest {
    pub payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub payment_method: String,
    /// Forwarded so retried attempts collapse into one intent.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntentResponse {
    pub id: String,
    pub status: String,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundResponse {
    pub id: String,
    pub intent_id: String,
    pub status: String,
    pub amount: i64,
}

/// Raw transport to a card gateway. Implementations only translate and
/// classify; resilience lives in [`GatewayClient`](crate::payments::client::GatewayClient).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates and confirms a manually captured intent.
    async fn create_intent(&self, request: &IntentRequest) -> GatewayResult<IntentResponse>;

    async fn capture(&self, intent_id: &str) -> GatewayResult<IntentResponse>;

    async fn cancel(&self, intent_id: &str) -> GatewayResult<IntentResponse>;

    async fn refund(&self, intent_id: &str, amount: i64) -> GatewayResult<RefundResponse>;

    fn name(&self) -> &'static str;
}
