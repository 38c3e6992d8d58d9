//! HTTP surface. Handlers stay thin and map one-to-one onto the services.

pub mod payments;
pub mod webhooks;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::health::{HealthChecker, HealthState, HealthStatus};
use crate::services::payment_orchestrator::PaymentOrchestrator;
use crate::services::webhook_processor::WebhookProcessor;
use payments::PaymentsState;
use webhooks::{WebhookState, MAX_WEBHOOK_BODY_BYTES};

/// Everything the router needs, built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub webhooks: Arc<WebhookProcessor>,
    pub health_checker: HealthChecker,
    pub request_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    let payment_routes = Router::new()
        .route(
            "/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/payments/{id}", get(payments::get_payment))
        .route("/payments/{id}/capture", post(payments::capture_payment))
        .route("/payments/{id}/cancel", post(payments::cancel_payment))
        .route("/payments/{id}/refund", post(payments::refund_payment))
        .with_state(PaymentsState {
            orchestrator: state.orchestrator,
            request_timeout: state.request_timeout,
        });

    let webhook_routes = Router::new()
        .route("/webhooks/stripe", post(webhooks::handle_webhook))
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY_BYTES))
        .with_state(WebhookState {
            processor: state.webhooks,
        });

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(state.health_checker);

    Router::new()
        .merge(payment_routes)
        .merge(webhook_routes)
        .merge(health_routes)
}

/// Full report. Degraded still answers 200.
async fn health(
    State(checker): State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = checker.check_health().await;

    if health_status.status == HealthState::Unhealthy {
        error!("Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    } else {
        debug!(status = ?health_status.status, "Health check passed");
        Ok(Json(health_status))
    }
}

async fn readiness(
    state: State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    health(state).await
}

async fn liveness() -> &'static str {
    "OK"
}
