//! Payment Orchestrator Service
//!
//! Drives every caller-initiated payment operation: load the record, check the
//! state machine guard, call the gateway through the resilient client, then
//! persist the resulting transition. Gateway failures are recorded on the
//! payment so the caller always learns the status the operation left behind.

use crate::context::RequestContext;
use crate::database::error::StoreError;
use crate::database::repository::PaymentStore;
use crate::error::{AppError, AppErrorKind, DomainError, ExternalError, InfrastructureError};
use crate::logging::mask_email;
use crate::payments::client::GatewayClient;
use crate::payments::error::{GatewayError, PaymentError};
use crate::payments::provider::IntentRequest;
use crate::payments::types::{NewPayment, Payment, PaymentOperation, PaymentStatus, Transition};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorErrorKind {
    #[error("{0}")]
    Payment(PaymentError),

    #[error("payment not found: {payment_id}")]
    NotFound { payment_id: String },

    #[error("{0}")]
    Gateway(GatewayError),

    #[error("cannot cancel payment: already captured at the gateway")]
    AlreadyCaptured,

    #[error("{0}")]
    Store(StoreError),

    #[error("operation interrupted: {0}")]
    Interrupted(crate::context::Interrupt),
}

/// Failure of an orchestrated operation, with the payment as it stands after
/// the failure (when one exists).
#[derive(Debug, Clone)]
pub struct OrchestratorError {
    pub kind: OrchestratorErrorKind,
    pub payment: Option<Payment>,
}

impl OrchestratorError {
    pub fn new(kind: OrchestratorErrorKind) -> Self {
        Self {
            kind,
            payment: None,
        }
    }

    pub fn with_payment(kind: OrchestratorErrorKind, payment: Payment) -> Self {
        Self {
            kind,
            payment: Some(payment),
        }
    }

    pub fn payment_status(&self) -> Option<PaymentStatus> {
        self.payment.as_ref().map(|p| p.status)
    }
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.payment {
            Some(payment) => write!(
                f,
                "{} (payment {} is {})",
                self.kind, payment.id, payment.status
            ),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<OrchestratorErrorKind> for OrchestratorError {
    fn from(kind: OrchestratorErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<PaymentError> for OrchestratorErrorKind {
    fn from(err: PaymentError) -> Self {
        OrchestratorErrorKind::Payment(err)
    }
}

impl From<PaymentError> for OrchestratorError {
    fn from(err: PaymentError) -> Self {
        Self::new(OrchestratorErrorKind::Payment(err))
    }
}

impl From<GatewayError> for OrchestratorError {
    fn from(err: GatewayError) -> Self {
        Self::new(OrchestratorErrorKind::Gateway(err))
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        Self::new(OrchestratorErrorKind::Store(err))
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        let status = err.payment_status();
        let app_error = match err.kind {
            OrchestratorErrorKind::Payment(e) => AppError::from(e),
            OrchestratorErrorKind::NotFound { payment_id } => {
                AppError::new(AppErrorKind::Domain(DomainError::PaymentNotFound { payment_id }))
            }
            OrchestratorErrorKind::Gateway(e) => AppError::from(e),
            OrchestratorErrorKind::AlreadyCaptured => {
                AppError::new(AppErrorKind::Domain(DomainError::AlreadyCaptured {
                    payment_id: err.payment.as_ref().map(|p| p.id.clone()),
                }))
            }
            OrchestratorErrorKind::Store(e) => AppError::new(AppErrorKind::Infrastructure(
                InfrastructureError::Store {
                    is_retryable: e.is_retryable(),
                    message: e.to_string(),
                },
            )),
            OrchestratorErrorKind::Interrupted(reason) => {
                AppError::new(AppErrorKind::External(ExternalError::Timeout {
                    reason: reason.to_string(),
                }))
            }
        };
        app_error.with_payment_status(status)
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

// ============================================================================
// Orchestrator
// ============================================================================

pub struct PaymentOrchestrator {
    store: Arc<dyn PaymentStore>,
    gateway: GatewayClient,
}

impl PaymentOrchestrator {
    pub fn new(store: Arc<dyn PaymentStore>, gateway: GatewayClient) -> Self {
        Self { store, gateway }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    pub fn store(&self) -> Arc<dyn PaymentStore> {
        Arc::clone(&self.store)
    }

    /// Creates a payment and authorizes it at the gateway.
    ///
    /// A known idempotency key returns the existing payment untouched.
    pub async fn create_payment(
        &self,
        ctx: &RequestContext,
        input: NewPayment,
    ) -> OrchestratorResult<Payment> {
        let mut payment = Payment::new(input)?;

        if let Some(key) = payment.idempotency_key.clone() {
            if let Some(existing) = self.find_by_idempotency_key(ctx, &key).await? {
                info!(
                    payment_id = %existing.id,
                    idempotency_key = %key,
                    status = %existing.status,
                    "Returning existing payment for idempotency key"
                );
                return Ok(existing);
            }
        }

        match self.read(ctx, self.store.save(&payment)).await {
            Ok(()) => {}
            Err(OrchestratorErrorKind::Store(StoreError::Conflict { message })) => {
                // Lost a race against a concurrent request with the same key.
                if let Some(key) = payment.idempotency_key.as_deref() {
                    if let Some(winner) = self.find_by_idempotency_key(ctx, key).await? {
                        info!(
                            payment_id = %winner.id,
                            idempotency_key = %key,
                            "Concurrent create resolved to existing payment"
                        );
                        return Ok(winner);
                    }
                }
                return Err(StoreError::Conflict { message }.into());
            }
            Err(kind) => return Err(kind.into()),
        }

        info!(
            payment_id = %payment.id,
            amount = payment.amount,
            currency = %payment.currency,
            email = %mask_email(&payment.email),
            "Payment created"
        );

        let request = IntentRequest {
            payment_id: payment.id.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            email: payment.email.clone(),
            payment_method: payment.payment_method.clone(),
            idempotency_key: Some(payment.id.clone()),
        };

        match self.gateway.create_intent(ctx, &request).await {
            Ok(intent) => {
                if let Err(e) = payment.attach_gateway_id(intent.id) {
                    return Err(OrchestratorError::with_payment(e.into(), payment));
                }
                self.commit(payment, Payment::complete, PaymentOperation::Create)
                    .await
            }
            Err(err) => Err(self
                .record_gateway_failure(payment, PaymentOperation::Create, err)
                .await),
        }
    }

    pub async fn get_payment(&self, ctx: &RequestContext, id: &str) -> OrchestratorResult<Payment> {
        self.load(ctx, id).await
    }

    /// All payments, newest first.
    pub async fn list_payments(&self, ctx: &RequestContext) -> OrchestratorResult<Vec<Payment>> {
        Ok(self.read(ctx, self.store.find_all()).await?)
    }

    pub async fn capture_payment(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> OrchestratorResult<Payment> {
        let payment = self.load(ctx, id).await?;
        if let Err(violation) = payment.can_capture() {
            return Err(self
                .reject(payment, PaymentOperation::Capture, violation)
                .await);
        }
        let intent_id = Self::intent_id(&payment)?;

        match self.gateway.capture(ctx, &intent_id).await {
            Ok(_) => {
                self.commit(payment, Payment::capture, PaymentOperation::Capture)
                    .await
            }
            Err(err) => Err(self
                .record_gateway_failure(payment, PaymentOperation::Capture, err)
                .await),
        }
    }

    pub async fn cancel_payment(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> OrchestratorResult<Payment> {
        let mut payment = self.load(ctx, id).await?;
        if let Err(violation) = payment.can_cancel() {
            return Err(self
                .reject(payment, PaymentOperation::Cancel, violation)
                .await);
        }
        let intent_id = match Self::intent_id(&payment) {
            Ok(intent_id) => intent_id,
            Err(e) => return Err(OrchestratorError::with_payment(e.kind, payment)),
        };

        match self.gateway.cancel(ctx, &intent_id).await {
            Ok(_) => {
                self.commit(payment, Payment::cancel, PaymentOperation::Cancel)
                    .await
            }
            Err(err) if err.is_unexpected_state() => {
                warn!(
                    payment_id = %payment.id,
                    intent_id = %intent_id,
                    "Gateway reports intent already captured, reconciling"
                );
                match payment.reconcile_captured() {
                    Ok(Transition::Applied { .. }) => {
                        if let Err(store_err) = self.persist(&payment).await {
                            error!(
                                payment_id = %payment.id,
                                error = %store_err,
                                "Failed to persist captured reconciliation"
                            );
                            return Err(OrchestratorError::with_payment(
                                OrchestratorErrorKind::Store(store_err),
                                payment,
                            ));
                        }
                    }
                    Ok(Transition::Unchanged) => {}
                    Err(e) => warn!(
                        payment_id = %payment.id,
                        error = %e,
                        "Cannot reconcile payment to captured"
                    ),
                }
                Err(OrchestratorError::with_payment(
                    OrchestratorErrorKind::AlreadyCaptured,
                    payment,
                ))
            }
            Err(err) => Err(self
                .record_gateway_failure(payment, PaymentOperation::Cancel, err)
                .await),
        }
    }

    /// Refunds `amount` minor units, or the full amount when `None`.
    pub async fn refund_payment(
        &self,
        ctx: &RequestContext,
        id: &str,
        amount: Option<i64>,
    ) -> OrchestratorResult<Payment> {
        let payment = self.load(ctx, id).await?;
        if let Err(violation) = payment.can_refund() {
            warn!(
                payment_id = %payment.id,
                status = %payment.status,
                reason = %violation,
                "Refund rejected by payment guard"
            );
            return Err(OrchestratorError::with_payment(violation.into(), payment));
        }

        let amount = match amount {
            None => payment.amount,
            Some(a) if a >= 1 && a <= payment.amount => a,
            Some(a) => {
                let violation = PaymentError::Validation {
                    message: format!(
                        "refund amount {} must be between 1 and {}",
                        a, payment.amount
                    ),
                    field: Some("amount".to_string()),
                };
                return Err(OrchestratorError::with_payment(violation.into(), payment));
            }
        };
        let intent_id = match Self::intent_id(&payment) {
            Ok(intent_id) => intent_id,
            Err(e) => return Err(OrchestratorError::with_payment(e.kind, payment)),
        };

        match self.gateway.refund(ctx, &intent_id, amount).await {
            Ok(refund) => {
                info!(
                    payment_id = %payment.id,
                    refund_id = %refund.id,
                    amount,
                    "Gateway refund accepted"
                );
                self.commit(payment, Payment::refund, PaymentOperation::Refund)
                    .await
            }
            Err(err) => Err(self
                .record_gateway_failure(payment, PaymentOperation::Refund, err)
                .await),
        }
    }

    // ------------------------------------------------------------------------
    // helpers
    // ------------------------------------------------------------------------

    /// Store call raced against the request context.
    async fn read<T, F>(&self, ctx: &RequestContext, call: F) -> Result<T, OrchestratorErrorKind>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match ctx.run(call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(OrchestratorErrorKind::Store(e)),
            Err(reason) => Err(OrchestratorErrorKind::Interrupted(reason)),
        }
    }

    async fn load(&self, ctx: &RequestContext, id: &str) -> OrchestratorResult<Payment> {
        match self.read(ctx, self.store.find_by_id(id)).await {
            Ok(payment) => Ok(payment),
            Err(OrchestratorErrorKind::Store(e)) if e.is_not_found() => {
                Err(OrchestratorErrorKind::NotFound {
                    payment_id: id.to_string(),
                }
                .into())
            }
            Err(kind) => Err(kind.into()),
        }
    }

    async fn find_by_idempotency_key(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> OrchestratorResult<Option<Payment>> {
        match self.read(ctx, self.store.find_by_idempotency_key(key)).await {
            Ok(payment) => Ok(Some(payment)),
            Err(OrchestratorErrorKind::Store(e)) if e.is_not_found() => Ok(None),
            Err(kind) => Err(kind.into()),
        }
    }

    fn intent_id(payment: &Payment) -> OrchestratorResult<String> {
        payment.gateway_ref().map(str::to_string).ok_or_else(|| {
            PaymentError::MissingGatewayReference {
                payment_id: payment.id.clone(),
            }
            .into()
        })
    }

    /// Writes the payment on a detached task so a caller that goes away
    /// cannot interrupt a write that follows a gateway side effect.
    async fn persist(&self, payment: &Payment) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        let record = payment.clone();
        match tokio::spawn(async move { store.update(&record).await }).await {
            Ok(result) => result,
            Err(join_err) => Err(StoreError::Unavailable {
                message: format!("update task failed: {}", join_err),
            }),
        }
    }

    /// Applies a successful transition and persists it.
    async fn commit(
        &self,
        mut payment: Payment,
        apply: fn(&mut Payment) -> Result<Transition, PaymentError>,
        operation: PaymentOperation,
    ) -> OrchestratorResult<Payment> {
        let from_state = payment.status;
        if let Err(e) = apply(&mut payment) {
            error!(
                payment_id = %payment.id,
                operation = %operation,
                error = %e,
                "Gateway succeeded but local transition was refused"
            );
            return Err(OrchestratorError::with_payment(e.into(), payment));
        }

        if let Err(e) = self.persist(&payment).await {
            error!(
                payment_id = %payment.id,
                operation = %operation,
                error = %e,
                "Failed to persist payment after gateway success"
            );
            return Err(OrchestratorError::with_payment(
                OrchestratorErrorKind::Store(e),
                payment,
            ));
        }

        info!(
            payment_id = %payment.id,
            operation = %operation,
            from_state = %from_state,
            to_state = %payment.status,
            "Payment state transitioned"
        );
        Ok(payment)
    }

    /// Marks the payment failed for `operation` and returns the gateway error
    /// carrying the updated payment.
    ///
    /// If the failure cannot be written, the store error is returned instead,
    /// carrying the payment as it is still stored.
    async fn record_gateway_failure(
        &self,
        mut payment: Payment,
        operation: PaymentOperation,
        err: GatewayError,
    ) -> OrchestratorError {
        let stored = payment.clone();
        match payment.fail(operation, err.to_string()) {
            Ok(Transition::Applied { from }) => {
                if let Err(store_err) = self.persist(&payment).await {
                    error!(
                        payment_id = %payment.id,
                        operation = %operation,
                        gateway_error = %err,
                        error = %store_err,
                        "Failed to persist gateway failure"
                    );
                    return OrchestratorError::with_payment(
                        OrchestratorErrorKind::Store(store_err),
                        stored,
                    );
                }
                warn!(
                    payment_id = %payment.id,
                    operation = %operation,
                    from_state = %from,
                    error = %err,
                    "Payment failed at gateway"
                );
            }
            Ok(Transition::Unchanged) => {}
            Err(e) => warn!(
                payment_id = %payment.id,
                operation = %operation,
                error = %e,
                "Gateway failure could not be recorded on payment"
            ),
        }
        OrchestratorError::with_payment(OrchestratorErrorKind::Gateway(err), payment)
    }

    /// Guard violation for capture or cancel. The payment is marked failed
    /// for the operation wherever the state machine allows it, except that a
    /// rejected cancel never fails a payment whose funds have settled.
    async fn reject(
        &self,
        mut payment: Payment,
        operation: PaymentOperation,
        violation: PaymentError,
    ) -> OrchestratorError {
        warn!(
            payment_id = %payment.id,
            operation = %operation,
            status = %payment.status,
            reason = %violation,
            "Operation rejected by payment guard"
        );

        let keep_settled =
            operation == PaymentOperation::Cancel && !payment.status.is_pre_settlement();
        if !keep_settled {
            let stored = payment.clone();
            if let Ok(Transition::Applied { .. }) = payment.fail(operation, violation.to_string()) {
                if let Err(store_err) = self.persist(&payment).await {
                    error!(
                        payment_id = %payment.id,
                        reason = %violation,
                        error = %store_err,
                        "Failed to persist guard failure"
                    );
                    return OrchestratorError::with_payment(
                        OrchestratorErrorKind::Store(store_err),
                        stored,
                    );
                }
            }
        }
        OrchestratorError::with_payment(OrchestratorErrorKind::Payment(violation), payment)
    }
}
