use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::webhook::SIGNATURE_HEADER;
use crate::services::webhook_processor::{WebhookProcessor, WebhookProcessorError};

/// Largest webhook body accepted.
pub const MAX_WEBHOOK_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct WebhookState {
    pub processor: Arc<WebhookProcessor>,
}

/// POST /webhooks/stripe
///
/// Bad signatures and unparseable payloads get 400 so the gateway stops
/// redelivering; store failures get 500 so it tries again.
pub async fn handle_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    info!(bytes = body.len(), "Received gateway webhook");

    match state.processor.handle_delivery(&body, signature).await {
        Ok(outcome) => {
            info!(outcome = outcome.as_str(), "Webhook processed");
            (
                StatusCode::OK,
                Json(serde_json::json!({"status": "ok", "outcome": outcome.as_str()})),
            )
                .into_response()
        }
        Err(e) => {
            match &e {
                WebhookProcessorError::InvalidSignature(reason) => {
                    warn!(reason = %reason, "Rejected webhook with invalid signature")
                }
                WebhookProcessorError::MalformedEvent(reason) => {
                    warn!(reason = %reason, "Rejected malformed webhook")
                }
                WebhookProcessorError::Store(reason) => {
                    error!(error = %reason, "Webhook processing failed")
                }
            }
            let mut app_error = AppError::from(e);
            app_error.request_id = request_id;
            app_error.into_response()
        }
    }
}
