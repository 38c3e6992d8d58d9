//! Helpers shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use payflow_backend::database::error::{StoreError, StoreResult};
use payflow_backend::database::memory_store::InMemoryPaymentStore;
use payflow_backend::database::repository::PaymentStore;
use payflow_backend::payments::types::Payment;
use payflow_backend::payments::webhook::{
    WebhookVerifier, DEFAULT_TOLERANCE_SECS, EVENT_INTENT_FAILED, EVENT_INTENT_SUCCEEDED,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE_SECS)
}

pub fn sign_now(payload: &[u8]) -> String {
    verifier()
        .sign(payload, chrono::Utc::now().timestamp())
        .unwrap()
}

pub fn intent_event(event_id: &str, event_type: &str, intent_id: &str) -> Vec<u8> {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    })
    .to_string()
    .into_bytes()
}

pub fn succeeded_event(intent_id: &str) -> Vec<u8> {
    intent_event("evt_succeeded", EVENT_INTENT_SUCCEEDED, intent_id)
}

pub fn failed_event(intent_id: &str, message: &str) -> Vec<u8> {
    serde_json::json!({
        "id": "evt_failed",
        "type": EVENT_INTENT_FAILED,
        "data": {
            "object": {
                "id": intent_id,
                "last_payment_error": { "message": message }
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// In-memory store that counts calls and can be switched to fail.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryPaymentStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    unavailable: AtomicBool,
    failing_updates: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes `update` fail while reads and inserts keep working.
    pub fn set_failing_updates(&self, failing: bool) {
        self.failing_updates.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn read(&self) -> StoreResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    fn write(&self) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()
    }
}

#[async_trait]
impl PaymentStore for RecordingStore {
    async fn save(&self, payment: &Payment) -> StoreResult<()> {
        self.write()?;
        self.inner.save(payment).await
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Payment> {
        self.read()?;
        self.inner.find_by_id(id).await
    }

    async fn find_by_gateway_id(&self, gateway_id: &str) -> StoreResult<Payment> {
        self.read()?;
        self.inner.find_by_gateway_id(gateway_id).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> StoreResult<Payment> {
        self.read()?;
        self.inner.find_by_idempotency_key(key).await
    }

    async fn update(&self, payment: &Payment) -> StoreResult<()> {
        self.write()?;
        if self.failing_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "update rejected".to_string(),
            });
        }
        self.inner.update(payment).await
    }

    async fn find_all(&self) -> StoreResult<Vec<Payment>> {
        self.read()?;
        self.inner.find_all().await
    }

    async fn remove(&self, id: &str) -> StoreResult<()> {
        self.write()?;
        self.inner.remove(id).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}

pub fn verifier_with_secret(secret: &str) -> WebhookVerifier {
    WebhookVerifier::new(secret, DEFAULT_TOLERANCE_SECS)
}
