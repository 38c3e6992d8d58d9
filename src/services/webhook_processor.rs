use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::database::error::StoreError;
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::database::repository::PaymentStore;
use crate::payments::error::PaymentError;
use crate::payments::types::{Payment, PaymentOperation, PaymentStatus, Transition};
use crate::payments::webhook::{parse_event, EventKind, GatewayEvent, WebhookError, WebhookVerifier};

const DEFAULT_FAILURE_REASON: &str = "payment failed at gateway";

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(WebhookError),
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<WebhookProcessorError> for AppError {
    fn from(err: WebhookProcessorError) -> Self {
        match err {
            WebhookProcessorError::InvalidSignature(e) => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidSignature {
                    reason: e.to_string(),
                }))
            }
            WebhookProcessorError::MalformedEvent(reason) => {
                AppError::new(AppErrorKind::Validation(ValidationError::MalformedBody { reason }))
            }
            WebhookProcessorError::Store(e) => e.into(),
        }
    }
}

/// What a delivered event did to local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied {
        payment_id: String,
        status: PaymentStatus,
    },
    /// Payment already in the reported state (replayed delivery).
    Unchanged { payment_id: String },
    /// Event type this service does not act on.
    Ignored { event_type: String },
    /// No local payment for the gateway intent.
    UnknownIntent { intent_id: String },
    /// The payment has moved past what the event reports.
    Stale {
        payment_id: String,
        status: PaymentStatus,
    },
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::Unchanged { .. } => "unchanged",
            WebhookOutcome::Ignored { .. } => "ignored",
            WebhookOutcome::UnknownIntent { .. } => "unknown_intent",
            WebhookOutcome::Stale { .. } => "stale",
        }
    }
}

/// Reconciles local payments with gateway-reported outcomes.
pub struct WebhookProcessor {
    verifier: WebhookVerifier,
    store: Arc<dyn PaymentStore>,
}

impl WebhookProcessor {
    pub fn new(verifier: WebhookVerifier, store: Arc<dyn PaymentStore>) -> Self {
        Self { verifier, store }
    }

    /// Verifies, parses, and applies one raw delivery. Nothing is read from
    /// the store until the signature checks out.
    pub async fn handle_delivery(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let signature = signature.ok_or(WebhookProcessorError::InvalidSignature(
            WebhookError::MissingSignature,
        ))?;

        if let Err(e) = self.verifier.verify(payload, signature) {
            error!(error = %e, "Invalid webhook signature");
            return Err(WebhookProcessorError::InvalidSignature(e));
        }

        let event = parse_event(payload).map_err(|e| {
            warn!(error = %e, "Signed webhook payload could not be parsed");
            WebhookProcessorError::MalformedEvent(e.to_string())
        })?;

        info!(
            event_id = %event.id,
            event_type = %event.kind.as_str(),
            "Received gateway webhook event"
        );
        self.process_event(&event).await
    }

    pub async fn process_event(
        &self,
        event: &GatewayEvent,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let apply: fn(&mut Payment, &GatewayEvent) -> Result<Transition, PaymentError> =
            match &event.kind {
                EventKind::Succeeded => |payment, _| payment.complete(),
                EventKind::Failed => |payment, event| {
                    let reason = event
                        .failure_message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string());
                    payment.fail(PaymentOperation::Webhook, reason)
                },
                EventKind::Other(event_type) => {
                    info!(event_id = %event.id, event_type = %event_type, "Unhandled gateway event");
                    return Ok(WebhookOutcome::Ignored {
                        event_type: event_type.clone(),
                    });
                }
            };

        let intent_id = event.intent_id.as_deref().ok_or_else(|| {
            WebhookProcessorError::MalformedEvent("event has no payment intent id".to_string())
        })?;

        let mut payment = match self.store.find_by_gateway_id(intent_id).await {
            Ok(payment) => payment,
            Err(e) if e.is_not_found() => {
                warn!(
                    event_id = %event.id,
                    intent_id = %intent_id,
                    "Webhook for unknown payment intent"
                );
                return Ok(WebhookOutcome::UnknownIntent {
                    intent_id: intent_id.to_string(),
                });
            }
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Failed to load payment for webhook");
                return Err(WebhookProcessorError::Store(e));
            }
        };

        match apply(&mut payment, event) {
            Ok(Transition::Applied { from }) => {
                self.store.update(&payment).await.map_err(|e| {
                    error!(
                        event_id = %event.id,
                        payment_id = %payment.id,
                        error = %e,
                        "Failed to persist webhook transition"
                    );
                    WebhookProcessorError::Store(e)
                })?;
                info!(
                    event_id = %event.id,
                    payment_id = %payment.id,
                    from_state = %from,
                    to_state = %payment.status,
                    "Payment reconciled from webhook"
                );
                Ok(WebhookOutcome::Applied {
                    payment_id: payment.id,
                    status: payment.status,
                })
            }
            Ok(Transition::Unchanged) => {
                debug!(event_id = %event.id, payment_id = %payment.id, "Webhook replay, no change");
                Ok(WebhookOutcome::Unchanged {
                    payment_id: payment.id,
                })
            }
            Err(e) => {
                warn!(
                    event_id = %event.id,
                    payment_id = %payment.id,
                    status = %payment.status,
                    reason = %e,
                    "Stale webhook event ignored"
                );
                Ok(WebhookOutcome::Stale {
                    payment_id: payment.id,
                    status: payment.status,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_store::InMemoryPaymentStore;

    #[test]
    fn test_error_mapping() {
        let err: AppError =
            WebhookProcessorError::InvalidSignature(WebhookError::SignatureMismatch).into();
        assert_eq!(err.status_code(), 400);

        let err: AppError = WebhookProcessorError::MalformedEvent("not json".to_string()).into();
        assert_eq!(err.status_code(), 400);

        let err: AppError = WebhookProcessorError::Store(StoreError::Unavailable {
            message: "down".to_string(),
        })
        .into();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_outcome_labels() {
        let outcome = WebhookOutcome::Stale {
            payment_id: "p1".to_string(),
            status: PaymentStatus::Captured,
        };
        assert_eq!(outcome.as_str(), "stale");
        assert_eq!(
            WebhookOutcome::Ignored {
                event_type: "charge.refunded".to_string()
            }
            .as_str(),
            "ignored"
        );
    }

    #[tokio::test]
    async fn test_missing_signature_rejected() {
        let processor = WebhookProcessor::new(
            WebhookVerifier::new("whsec_test", 300),
            Arc::new(InMemoryPaymentStore::new()),
        );
        let err = processor.handle_delivery(b"{}", None).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookProcessorError::InvalidSignature(WebhookError::MissingSignature)
        ));
    }
}
