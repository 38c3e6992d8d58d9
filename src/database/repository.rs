use crate::database::error::StoreResult;
use crate::payments::types::Payment;
use async_trait::async_trait;

/// Persistence contract for payments.
///
/// Lookups return [`StoreError::NotFound`](crate::database::error::StoreError::NotFound)
/// for a missing record. `save` rejects a duplicate id or idempotency key with
/// `Conflict`. `update` replaces the stored record in one atomic step and
/// returns `NotFound` for an unknown id.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn save(&self, payment: &Payment) -> StoreResult<()>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Payment>;

    async fn find_by_gateway_id(&self, gateway_id: &str) -> StoreResult<Payment>;

    async fn find_by_idempotency_key(&self, key: &str) -> StoreResult<Payment>;

    async fn update(&self, payment: &Payment) -> StoreResult<()>;

    /// All payments, newest first.
    async fn find_all(&self) -> StoreResult<Vec<Payment>>;

    async fn remove(&self, id: &str) -> StoreResult<()>;

    /// Cheap round trip used by readiness probes.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str;
}
