use crate::payments::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Record saved, gateway intent not confirmed yet
    Pending,
    /// Gateway intent authorized
    Completed,
    Failed,
    /// Authorized funds settled
    Captured,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Canceled => "CANCELED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    /// Funds have not moved yet at the gateway.
    pub fn is_pre_settlement(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Completed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CAPTURED" => Ok(PaymentStatus::Captured),
            "CANCELED" | "CANCELLED" => Ok(PaymentStatus::Canceled),
            "REFUNDED" | "REFUND" => Ok(PaymentStatus::Refunded),
            _ => Err(PaymentError::Validation {
                message: format!("unknown payment status: {}", value),
                field: Some("status".to_string()),
            }),
        }
    }
}

/// Operation that drove a payment into its current state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOperation {
    Create,
    Capture,
    Cancel,
    Refund,
    Webhook,
}

impl PaymentOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOperation::Create => "create",
            PaymentOperation::Capture => "capture",
            PaymentOperation::Cancel => "cancel",
            PaymentOperation::Refund => "refund",
            PaymentOperation::Webhook => "webhook",
        }
    }
}

impl fmt::Display for PaymentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentOperation {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "create" => Ok(PaymentOperation::Create),
            "capture" => Ok(PaymentOperation::Capture),
            "cancel" => Ok(PaymentOperation::Cancel),
            "refund" => Ok(PaymentOperation::Refund),
            "webhook" => Ok(PaymentOperation::Webhook),
            _ => Err(PaymentError::Validation {
                message: format!("unknown payment operation: {}", value),
                field: Some("failed_operation".to_string()),
            }),
        }
    }
}

/// Caller input for a new payment, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub payment_method: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Outcome of applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: PaymentStatus },
    /// Already in the target state; nothing was touched.
    Unchanged,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub id: String,
    pub gateway_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub payment_method: String,
    pub idempotency_key: Option<String>,
    pub status: PaymentStatus,
    pub failed_operation: Option<PaymentOperation>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Validates the input and builds a `PENDING` payment with a fresh id.
    pub fn new(input: NewPayment) -> Result<Self, PaymentError> {
        if input.amount <= 0 {
            return Err(PaymentError::Validation {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }
        let currency = input.currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(PaymentError::Validation {
                message: "currency is required".to_string(),
                field: Some("currency".to_string()),
            });
        }
        let email = input.email.trim().to_string();
        if email.is_empty() {
            return Err(PaymentError::Validation {
                message: "email is required".to_string(),
                field: Some("email".to_string()),
            });
        }
        let payment_method = input.payment_method.trim().to_string();
        if payment_method.is_empty() {
            return Err(PaymentError::Validation {
                message: "payment method is required".to_string(),
                field: Some("payment_method".to_string()),
            });
        }
        let idempotency_key = input
            .idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            gateway_id: None,
            amount: input.amount,
            currency,
            email,
            payment_method,
            idempotency_key,
            status: PaymentStatus::Pending,
            failed_operation: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Gateway reference, if one has been attached.
    pub fn gateway_ref(&self) -> Option<&str> {
        self.gateway_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Records the gateway intent id. Re-attaching the same id is a no-op.
    pub fn attach_gateway_id(&mut self, gateway_id: impl Into<String>) -> Result<(), PaymentError> {
        let gateway_id = gateway_id.into();
        if gateway_id.trim().is_empty() {
            return Err(PaymentError::Validation {
                message: "gateway id cannot be empty".to_string(),
                field: Some("gateway_id".to_string()),
            });
        }
        match self.gateway_ref() {
            Some(existing) if existing == gateway_id => Ok(()),
            Some(existing) => Err(PaymentError::GatewayIdAlreadySet {
                payment_id: self.id.clone(),
                existing: existing.to_string(),
            }),
            None => {
                self.gateway_id = Some(gateway_id);
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    /// Whether the state machine has an edge from the current status to `target`.
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self.status, target) {
            (Pending, Completed | Failed | Canceled) => true,
            (Completed, Captured | Failed | Canceled) => true,
            (Captured, Refunded | Failed) => true,
            (Failed, Canceled | Captured) => self.failed_by_cancel(),
            _ => false,
        }
    }

    pub fn failed_by_cancel(&self) -> bool {
        self.status == PaymentStatus::Failed
            && self.failed_operation == Some(PaymentOperation::Cancel)
    }

    fn transition(&mut self, target: PaymentStatus) -> Result<Transition, PaymentError> {
        if self.status == target {
            return Ok(Transition::Unchanged);
        }
        if !self.can_transition_to(target) {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        let from = self.status;
        self.status = target;
        if target != PaymentStatus::Failed {
            self.failed_operation = None;
            self.failure_reason = None;
        }
        self.updated_at = Utc::now();
        Ok(Transition::Applied { from })
    }

    pub fn complete(&mut self) -> Result<Transition, PaymentError> {
        self.transition(PaymentStatus::Completed)
    }

    pub fn capture(&mut self) -> Result<Transition, PaymentError> {
        self.transition(PaymentStatus::Captured)
    }

    pub fn cancel(&mut self) -> Result<Transition, PaymentError> {
        self.transition(PaymentStatus::Canceled)
    }

    pub fn refund(&mut self) -> Result<Transition, PaymentError> {
        self.transition(PaymentStatus::Refunded)
    }

    /// Moves to `FAILED`, remembering which operation failed and why.
    ///
    /// A payment that is already `FAILED` keeps its original failure record.
    pub fn fail(
        &mut self,
        operation: PaymentOperation,
        reason: impl Into<String>,
    ) -> Result<Transition, PaymentError> {
        let outcome = self.transition(PaymentStatus::Failed)?;
        if outcome.is_applied() {
            self.failed_operation = Some(operation);
            self.failure_reason = Some(reason.into());
        }
        Ok(outcome)
    }

    /// Brings the payment forward to `CAPTURED` when the gateway reports the
    /// intent as captured, walking through `COMPLETED` if needed.
    pub fn reconcile_captured(&mut self) -> Result<Transition, PaymentError> {
        let from = self.status;
        if self.status == PaymentStatus::Pending {
            self.complete()?;
        }
        match self.capture()? {
            Transition::Unchanged if from == PaymentStatus::Captured => Ok(Transition::Unchanged),
            _ => Ok(Transition::Applied { from }),
        }
    }

    pub fn can_capture(&self) -> Result<(), PaymentError> {
        if self.status != PaymentStatus::Completed {
            return Err(PaymentError::GuardViolation {
                operation: PaymentOperation::Capture,
                status: self.status,
                message: "payment must be completed before capture".to_string(),
            });
        }
        if self.gateway_ref().is_none() {
            return Err(PaymentError::MissingGatewayReference {
                payment_id: self.id.clone(),
            });
        }
        Ok(())
    }

    pub fn can_cancel(&self) -> Result<(), PaymentError> {
        let message = match self.status {
            PaymentStatus::Pending | PaymentStatus::Completed => return Ok(()),
            PaymentStatus::Failed if self.failed_by_cancel() => return Ok(()),
            PaymentStatus::Canceled => "payment already canceled",
            PaymentStatus::Captured => "cannot cancel: payment already captured",
            PaymentStatus::Refunded => "payment already refunded",
            PaymentStatus::Failed => "payment failed and cannot be canceled",
        };
        Err(PaymentError::GuardViolation {
            operation: PaymentOperation::Cancel,
            status: self.status,
            message: message.to_string(),
        })
    }

    pub fn can_refund(&self) -> Result<(), PaymentError> {
        if self.status != PaymentStatus::Captured {
            return Err(PaymentError::GuardViolation {
                operation: PaymentOperation::Refund,
                status: self.status,
                message: "payment must be captured before refund".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_payment() -> Payment {
        Payment::new(NewPayment {
            amount: 1000,
            currency: "usd".to_string(),
            email: "a@b.com".to_string(),
            payment_method: "card".to_string(),
            idempotency_key: Some("  ".to_string()),
        })
        .expect("valid payment")
    }

    #[test]
    fn new_payment_normalizes_input() {
        let payment = new_payment();
        assert_eq!(payment.currency, "USD");
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.gateway_id.is_none());
        assert!(payment.idempotency_key.is_none());
        assert_eq!(payment.created_at, payment.updated_at);
    }

    #[test]
    fn new_payment_rejects_invalid_input() {
        let base = NewPayment {
            amount: 1000,
            currency: "usd".to_string(),
            email: "a@b.com".to_string(),
            payment_method: "card".to_string(),
            idempotency_key: None,
        };

        let cases = [
            (NewPayment { amount: 0, ..base.clone() }, "amount"),
            (NewPayment { amount: -5, ..base.clone() }, "amount"),
            (NewPayment { currency: " ".to_string(), ..base.clone() }, "currency"),
            (NewPayment { email: String::new(), ..base.clone() }, "email"),
            (NewPayment { payment_method: String::new(), ..base.clone() }, "payment_method"),
        ];
        for (input, field) in cases {
            match Payment::new(input) {
                Err(PaymentError::Validation { field: Some(f), .. }) => assert_eq!(f, field),
                other => panic!("expected validation error on {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn pending_cannot_skip_to_captured_or_refunded() {
        let mut payment = new_payment();
        assert!(payment.capture().is_err());
        assert!(payment.refund().is_err());
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn happy_path_transitions() {
        let mut payment = new_payment();
        assert!(payment.complete().unwrap().is_applied());
        assert!(payment.capture().unwrap().is_applied());
        assert!(payment.refund().unwrap().is_applied());
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert!(payment.cancel().is_err());
        assert!(payment.fail(PaymentOperation::Webhook, "late").is_err());
    }

    #[test]
    fn repeated_transition_is_a_no_op() {
        let mut payment = new_payment();
        payment.complete().unwrap();
        let snapshot = payment.clone();
        assert_eq!(payment.complete().unwrap(), Transition::Unchanged);
        assert_eq!(payment, snapshot);
    }

    #[test]
    fn fail_records_operation_and_keeps_first_reason() {
        let mut payment = new_payment();
        payment.fail(PaymentOperation::Create, "gateway down").unwrap();
        assert_eq!(payment.failed_operation, Some(PaymentOperation::Create));

        payment.fail(PaymentOperation::Webhook, "again").unwrap();
        assert_eq!(payment.failure_reason.as_deref(), Some("gateway down"));
    }

    #[test]
    fn failed_cancel_can_be_retried() {
        let mut payment = new_payment();
        payment.complete().unwrap();
        payment.fail(PaymentOperation::Cancel, "timeout").unwrap();

        assert!(payment.can_cancel().is_ok());
        payment.cancel().unwrap();
        assert_eq!(payment.status, PaymentStatus::Canceled);
        assert!(payment.failed_operation.is_none());
    }

    #[test]
    fn failed_capture_is_terminal() {
        let mut payment = new_payment();
        payment.complete().unwrap();
        payment.fail(PaymentOperation::Capture, "declined").unwrap();

        assert!(payment.can_cancel().is_err());
        assert!(payment.cancel().is_err());
        assert!(payment.complete().is_err());
    }

    #[test]
    fn cancel_guard_rejects_settled_and_terminal_states() {
        let mut payment = new_payment();
        payment.complete().unwrap();
        payment.capture().unwrap();
        let err = payment.can_cancel().unwrap_err();
        assert!(err.to_string().contains("already captured"));

        payment.refund().unwrap();
        assert!(payment.can_cancel().is_err());

        let mut canceled = new_payment();
        canceled.cancel().unwrap();
        let err = canceled.can_cancel().unwrap_err();
        assert!(err.to_string().contains("already canceled"));
    }

    #[test]
    fn capture_guard_requires_completed_and_gateway_id() {
        let mut payment = new_payment();
        assert!(matches!(
            payment.can_capture(),
            Err(PaymentError::GuardViolation { .. })
        ));

        payment.complete().unwrap();
        assert!(matches!(
            payment.can_capture(),
            Err(PaymentError::MissingGatewayReference { .. })
        ));

        payment.attach_gateway_id("pi_123").unwrap();
        assert!(payment.can_capture().is_ok());
    }

    #[test]
    fn refund_guard_message() {
        let payment = new_payment();
        let err = payment.can_refund().unwrap_err();
        assert!(err.to_string().contains("must be captured before refund"));
    }

    #[test]
    fn gateway_id_is_set_at_most_once() {
        let mut payment = new_payment();
        payment.attach_gateway_id("pi_1").unwrap();
        payment.attach_gateway_id("pi_1").unwrap();
        assert!(payment.attach_gateway_id("pi_2").is_err());
        assert_eq!(payment.gateway_ref(), Some("pi_1"));
    }

    #[test]
    fn reconcile_captured_walks_through_completed() {
        let mut payment = new_payment();
        let outcome = payment.reconcile_captured().unwrap();
        assert_eq!(
            outcome,
            Transition::Applied {
                from: PaymentStatus::Pending
            }
        );
        assert_eq!(payment.status, PaymentStatus::Captured);

        assert_eq!(payment.reconcile_captured().unwrap(), Transition::Unchanged);
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_value(PaymentStatus::Canceled).unwrap();
        assert_eq!(json, "CANCELED");
        assert_eq!(
            "refunded".parse::<PaymentStatus>().unwrap(),
            PaymentStatus::Refunded
        );
    }
}
