//! Payment lifecycle endpoints
//!
//! Each handler runs its orchestrator call on a spawned task that owns a
//! per-request context. If the client disconnects, the handler future is
//! dropped, the context is cancelled, and the task still records what the
//! interrupted gateway call did to the payment.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::context::RequestContext;
use crate::error::{AppError, AppErrorKind, InfrastructureError, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::types::{NewPayment, Payment};
use crate::services::payment_orchestrator::{OrchestratorResult, PaymentOrchestrator};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Clone)]
pub struct PaymentsState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub request_timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<Payment>,
    pub count: usize,
}

fn malformed(reason: impl Into<String>) -> AppError {
    AppError::new(AppErrorKind::Validation(ValidationError::MalformedBody {
        reason: reason.into(),
    }))
}

fn attach_request_id(mut err: AppError, request_id: &Option<String>) -> AppError {
    err.request_id = request_id.clone();
    err
}

/// Runs `op` on its own task under a fresh request context.
async fn run_detached<T, F, Fut>(
    state: &PaymentsState,
    request_id: &Option<String>,
    op: F,
) -> Result<T, AppError>
where
    F: FnOnce(Arc<PaymentOrchestrator>, RequestContext) -> Fut,
    Fut: Future<Output = OrchestratorResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let ctx = RequestContext::with_timeout(state.request_timeout);
    let guard = ctx.token().clone().drop_guard();
    let task = tokio::spawn(op(Arc::clone(&state.orchestrator), ctx));

    let joined = task.await;
    guard.disarm();

    match joined {
        Ok(result) => result.map_err(|e| attach_request_id(AppError::from(e), request_id)),
        Err(join_err) => {
            error!(error = %join_err, "Payment task failed");
            Err(attach_request_id(
                AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Internal {
                    message: join_err.to_string(),
                })),
                request_id,
            ))
        }
    }
}

/// POST /payments
pub async fn create_payment(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
    body: Result<Json<NewPayment>, JsonRejection>,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);
    let mut input = match body {
        Ok(Json(input)) => input,
        Err(rejection) => {
            return attach_request_id(malformed(rejection.body_text()), &request_id)
                .into_response()
        }
    };

    if let Some(key) = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    {
        input.idempotency_key = Some(key.to_string());
    }

    let result = run_detached(&state, &request_id, move |orchestrator, ctx| async move {
        orchestrator.create_payment(&ctx, input).await
    })
    .await;

    match result {
        Ok(payment) => {
            info!(payment_id = %payment.id, status = %payment.status, "Create payment handled");
            (StatusCode::CREATED, Json(payment)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// GET /payments
pub async fn list_payments(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
) -> Result<Json<PaymentListResponse>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let payments = run_detached(&state, &request_id, |orchestrator, ctx| async move {
        orchestrator.list_payments(&ctx).await
    })
    .await?;

    Ok(Json(PaymentListResponse {
        count: payments.len(),
        payments,
    }))
}

/// GET /payments/{id}
pub async fn get_payment(
    State(state): State<PaymentsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Payment>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let payment = run_detached(&state, &request_id, move |orchestrator, ctx| async move {
        orchestrator.get_payment(&ctx, &id).await
    })
    .await?;
    Ok(Json(payment))
}

/// POST /payments/{id}/capture
pub async fn capture_payment(
    State(state): State<PaymentsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Payment>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let payment = run_detached(&state, &request_id, move |orchestrator, ctx| async move {
        orchestrator.capture_payment(&ctx, &id).await
    })
    .await?;
    Ok(Json(payment))
}

/// POST /payments/{id}/cancel
pub async fn cancel_payment(
    State(state): State<PaymentsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Payment>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let payment = run_detached(&state, &request_id, move |orchestrator, ctx| async move {
        orchestrator.cancel_payment(&ctx, &id).await
    })
    .await?;
    Ok(Json(payment))
}

/// POST /payments/{id}/refund
///
/// The body is optional; without an `amount` the full payment is refunded.
pub async fn refund_payment(
    State(state): State<PaymentsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Payment>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RefundRequest::default()
    } else {
        serde_json::from_slice::<RefundRequest>(&body)
            .map_err(|e| attach_request_id(malformed(e.to_string()), &request_id))?
    };

    let payment = run_detached(&state, &request_id, move |orchestrator, ctx| async move {
        orchestrator
            .refund_payment(&ctx, &id, request.amount)
            .await
    })
    .await?;
    Ok(Json(payment))
}
