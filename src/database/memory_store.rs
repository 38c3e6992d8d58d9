use crate::database::error::{StoreError, StoreResult};
use crate::database::repository::PaymentStore;
use crate::payments::types::Payment;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    payments: HashMap<String, Payment>,
    by_gateway_id: HashMap<String, String>,
    by_idempotency_key: HashMap<String, String>,
}

impl Tables {
    fn check_unique(&self, payment: &Payment) -> StoreResult<()> {
        if let Some(gateway_id) = payment.gateway_ref() {
            if let Some(owner) = self.by_gateway_id.get(gateway_id) {
                if owner != &payment.id {
                    return Err(StoreError::Conflict {
                        message: format!("gateway id {} already belongs to {}", gateway_id, owner),
                    });
                }
            }
        }
        if let Some(key) = payment.idempotency_key.as_deref() {
            if let Some(owner) = self.by_idempotency_key.get(key) {
                if owner != &payment.id {
                    return Err(StoreError::Conflict {
                        message: format!("idempotency key {} already used", key),
                    });
                }
            }
        }
        Ok(())
    }

    fn unindex(&mut self, payment: &Payment) {
        if let Some(gateway_id) = payment.gateway_ref() {
            self.by_gateway_id.remove(gateway_id);
        }
        if let Some(key) = payment.idempotency_key.as_deref() {
            self.by_idempotency_key.remove(key);
        }
    }

    fn index(&mut self, payment: &Payment) {
        if let Some(gateway_id) = payment.gateway_ref() {
            self.by_gateway_id
                .insert(gateway_id.to_string(), payment.id.clone());
        }
        if let Some(key) = payment.idempotency_key.as_deref() {
            self.by_idempotency_key
                .insert(key.to_string(), payment.id.clone());
        }
    }

    fn lookup(&self, id: Option<&String>, entity_key: &str) -> StoreResult<Payment> {
        id.and_then(|id| self.payments.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found("payment", entity_key))
    }
}

/// Thread-safe in-memory payment store.
///
/// A single `RwLock` guards the records and both secondary indexes so every
/// write is atomic with respect to readers.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.payments.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn save(&self, payment: &Payment) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.payments.contains_key(&payment.id) {
            return Err(StoreError::Conflict {
                message: format!("payment {} already exists", payment.id),
            });
        }
        tables.check_unique(payment)?;
        tables.index(payment);
        tables.payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Payment> {
        let tables = self.tables.read().await;
        tables
            .payments
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("payment", id))
    }

    async fn find_by_gateway_id(&self, gateway_id: &str) -> StoreResult<Payment> {
        let tables = self.tables.read().await;
        tables.lookup(tables.by_gateway_id.get(gateway_id), gateway_id)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> StoreResult<Payment> {
        let tables = self.tables.read().await;
        tables.lookup(tables.by_idempotency_key.get(key), key)
    }

    async fn update(&self, payment: &Payment) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let previous = tables
            .payments
            .get(&payment.id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("payment", payment.id.as_str()))?;
        tables.check_unique(payment)?;
        tables.unindex(&previous);
        tables.index(payment);
        tables.payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn find_all(&self) -> StoreResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables.payments.values().cloned().collect();
        payments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(payments)
    }

    async fn remove(&self, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let removed = tables
            .payments
            .remove(id)
            .ok_or_else(|| StoreError::not_found("payment", id))?;
        tables.unindex(&removed);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{NewPayment, PaymentStatus};

    fn payment(key: Option<&str>) -> Payment {
        Payment::new(NewPayment {
            amount: 500,
            currency: "eur".to_string(),
            email: "a@b.com".to_string(),
            payment_method: "card".to_string(),
            idempotency_key: key.map(str::to_string),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn save_and_find_by_every_index() {
        let store = InMemoryPaymentStore::new();
        let mut p = payment(Some("k1"));
        store.save(&p).await.unwrap();

        p.attach_gateway_id("pi_1").unwrap();
        p.complete().unwrap();
        store.update(&p).await.unwrap();

        assert_eq!(store.find_by_id(&p.id).await.unwrap(), p);
        assert_eq!(store.find_by_gateway_id("pi_1").await.unwrap().id, p.id);
        assert_eq!(store.find_by_idempotency_key("k1").await.unwrap().id, p.id);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = InMemoryPaymentStore::new();
        assert!(store.find_by_id("nope").await.unwrap_err().is_not_found());
        assert!(store.find_by_gateway_id("pi_x").await.unwrap_err().is_not_found());
        assert!(store.update(&payment(None)).await.unwrap_err().is_not_found());
        assert!(store.remove("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn duplicate_keys_conflict() {
        let store = InMemoryPaymentStore::new();
        let first = payment(Some("dup"));
        store.save(&first).await.unwrap();

        assert!(matches!(
            store.save(&first).await,
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            store.save(&payment(Some("dup"))).await,
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_replaces_whole_record() {
        let store = InMemoryPaymentStore::new();
        let mut p = payment(None);
        store.save(&p).await.unwrap();

        p.cancel().unwrap();
        store.update(&p).await.unwrap();
        let stored = store.find_by_id(&p.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Canceled);
        assert_eq!(stored.updated_at, p.updated_at);
    }

    #[tokio::test]
    async fn remove_drops_indexes() {
        let store = InMemoryPaymentStore::new();
        let p = payment(Some("k2"));
        store.save(&p).await.unwrap();
        store.remove(&p.id).await.unwrap();

        assert!(store.is_empty().await);
        assert!(store.find_by_idempotency_key("k2").await.is_err());
        store.save(&payment(Some("k2"))).await.unwrap();
    }

    #[tokio::test]
    async fn find_all_returns_newest_first() {
        let store = InMemoryPaymentStore::new();
        let mut older = payment(None);
        older.created_at -= chrono::Duration::seconds(10);
        let newer = payment(None);
        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newer.id);
    }
}
