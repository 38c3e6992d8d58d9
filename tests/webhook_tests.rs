mod common;

use common::{failed_event, intent_event, sign_now, succeeded_event, verifier, RecordingStore};
use payflow_backend::database::repository::PaymentStore;
use payflow_backend::payments::types::{NewPayment, Payment, PaymentOperation, PaymentStatus};
use payflow_backend::payments::webhook::WebhookError;
use payflow_backend::services::webhook_processor::{
    WebhookOutcome, WebhookProcessor, WebhookProcessorError,
};
use std::sync::Arc;

fn processor(store: Arc<RecordingStore>) -> WebhookProcessor {
    WebhookProcessor::new(verifier(), store)
}

/// Saves a payment linked to `intent_id` in the given status.
async fn seed(store: &RecordingStore, intent_id: &str, status: PaymentStatus) -> Payment {
    let mut payment = Payment::new(NewPayment {
        amount: 1000,
        currency: "usd".to_string(),
        email: "a@b.com".to_string(),
        payment_method: "card".to_string(),
        idempotency_key: None,
    })
    .unwrap();
    payment.attach_gateway_id(intent_id.to_string()).unwrap();
    match status {
        PaymentStatus::Pending => {}
        PaymentStatus::Completed => {
            payment.complete().unwrap();
        }
        PaymentStatus::Captured => {
            payment.complete().unwrap();
            payment.capture().unwrap();
        }
        other => panic!("unsupported seed status {}", other),
    }
    store.save(&payment).await.unwrap();
    payment
}

#[tokio::test]
async fn succeeded_event_completes_pending_payment() {
    let store = Arc::new(RecordingStore::new());
    let payment = seed(&store, "pi_1", PaymentStatus::Pending).await;
    let body = succeeded_event("pi_1");

    let outcome = processor(store.clone())
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::Applied {
            payment_id: payment.id.clone(),
            status: PaymentStatus::Completed,
        }
    );
    assert_eq!(
        store.find_by_id(&payment.id).await.unwrap().status,
        PaymentStatus::Completed
    );
}

#[tokio::test]
async fn replayed_event_is_idempotent() {
    let store = Arc::new(RecordingStore::new());
    let payment = seed(&store, "pi_1", PaymentStatus::Pending).await;
    let body = succeeded_event("pi_1");
    let processor = processor(store.clone());

    processor
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap();
    let once = store.find_by_id(&payment.id).await.unwrap();
    let writes_after_first = store.writes();

    let outcome = processor
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap();
    let twice = store.find_by_id(&payment.id).await.unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::Unchanged {
            payment_id: payment.id.clone()
        }
    );
    assert_eq!(once, twice);
    assert_eq!(store.writes(), writes_after_first);
}

#[tokio::test]
async fn failed_event_records_gateway_message() {
    let store = Arc::new(RecordingStore::new());
    let payment = seed(&store, "pi_1", PaymentStatus::Completed).await;
    let body = failed_event("pi_1", "Your card has insufficient funds.");

    processor(store.clone())
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap();

    let stored = store.find_by_id(&payment.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(stored.failed_operation, Some(PaymentOperation::Webhook));
    assert_eq!(
        stored.failure_reason.as_deref(),
        Some("Your card has insufficient funds.")
    );
}

#[tokio::test]
async fn stale_event_does_not_move_captured_payment() {
    let store = Arc::new(RecordingStore::new());
    let payment = seed(&store, "pi_1", PaymentStatus::Captured).await;
    let writes_before = store.writes();
    let body = succeeded_event("pi_1");

    let outcome = processor(store.clone())
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::Stale {
            payment_id: payment.id.clone(),
            status: PaymentStatus::Captured,
        }
    );
    assert_eq!(store.writes(), writes_before);
    assert_eq!(
        store.find_by_id(&payment.id).await.unwrap().status,
        PaymentStatus::Captured
    );
}

#[tokio::test]
async fn unknown_intent_is_dropped_without_fabricating_a_record() {
    let store = Arc::new(RecordingStore::new());
    let body = succeeded_event("pi_unknown");

    let outcome = processor(store.clone())
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::UnknownIntent {
            intent_id: "pi_unknown".to_string()
        }
    );
    assert_eq!(store.writes(), 0);
    assert!(store.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn other_event_types_are_ignored() {
    let store = Arc::new(RecordingStore::new());
    seed(&store, "pi_1", PaymentStatus::Pending).await;
    let body = intent_event("evt_2", "charge.refunded", "pi_1");

    let outcome = processor(store.clone())
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::Ignored {
            event_type: "charge.refunded".to_string()
        }
    );
    assert_eq!(store.reads(), 0);
}

#[tokio::test]
async fn bad_signature_is_rejected_before_store_access() {
    let store = Arc::new(RecordingStore::new());
    let body = succeeded_event("pi_1");
    let forged = common::verifier_with_secret("whsec_other")
        .sign(&body, chrono::Utc::now().timestamp())
        .unwrap();
    let processor = processor(store.clone());

    let err = processor
        .handle_delivery(&body, Some(&forged))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WebhookProcessorError::InvalidSignature(WebhookError::SignatureMismatch)
    ));

    let err = processor.handle_delivery(&body, None).await.unwrap_err();
    assert!(matches!(
        err,
        WebhookProcessorError::InvalidSignature(WebhookError::MissingSignature)
    ));

    let stale = verifier()
        .sign(&body, chrono::Utc::now().timestamp() - 3600)
        .unwrap();
    let err = processor
        .handle_delivery(&body, Some(&stale))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WebhookProcessorError::InvalidSignature(WebhookError::TimestampOutOfTolerance { .. })
    ));

    assert_eq!(store.reads(), 0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn signed_garbage_is_malformed() {
    let store = Arc::new(RecordingStore::new());
    let body = b"not json".to_vec();

    let err = processor(store.clone())
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookProcessorError::MalformedEvent(_)));
    assert_eq!(store.reads(), 0);
}

#[tokio::test]
async fn store_outage_is_surfaced() {
    let store = Arc::new(RecordingStore::new());
    seed(&store, "pi_1", PaymentStatus::Pending).await;
    store.set_unavailable(true);
    let body = succeeded_event("pi_1");

    let err = processor(store.clone())
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookProcessorError::Store(_)));
}

#[tokio::test]
async fn unconfigured_secret_rejects_everything() {
    let store = Arc::new(RecordingStore::new());
    let processor = WebhookProcessor::new(common::verifier_with_secret(""), store.clone());
    let body = succeeded_event("pi_1");

    let err = processor
        .handle_delivery(&body, Some(&sign_now(&body)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WebhookProcessorError::InvalidSignature(WebhookError::NotConfigured)
    ));
    assert_eq!(store.reads(), 0);
}
