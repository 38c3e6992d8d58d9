//! Services module for business logic

pub mod payment_orchestrator;
pub mod webhook_processor;

pub use crate::services::payment_orchestrator::{
    OrchestratorError, OrchestratorErrorKind, OrchestratorResult, PaymentOrchestrator,
};
pub use crate::services::webhook_processor::{
    WebhookOutcome, WebhookProcessor, WebhookProcessorError,
};
