//! Application error taxonomy
//!
//! Every failure that reaches the HTTP edge is an [`AppError`]: a kind from one
//! of four families (domain, infrastructure, external, validation) plus the
//! request id and, when one exists, the payment status the failure left behind.

use crate::context::Interrupt;
use crate::database::error::StoreError;
use crate::payments::error::{GatewayError, PaymentError};
use crate::payments::types::PaymentStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "INVALID_PAYMENT_STATE")]
    InvalidPaymentState,
    #[serde(rename = "PAYMENT_ALREADY_CAPTURED")]
    PaymentAlreadyCaptured,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (422, 502, 503, 504)
    #[serde(rename = "GATEWAY_UNAUTHORIZED")]
    GatewayUnauthorized,
    #[serde(rename = "GATEWAY_REJECTED")]
    GatewayRejected,
    #[serde(rename = "GATEWAY_ERROR")]
    GatewayError,
    #[serde(rename = "GATEWAY_UNAVAILABLE")]
    GatewayUnavailable,
    #[serde(rename = "GATEWAY_TIMEOUT")]
    GatewayTimeout,

    // Generic
    #[serde(rename = "INVALID_SIGNATURE")]
    InvalidSignature,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Business rule violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    PaymentNotFound { payment_id: String },
    /// State machine guard or transition refused the operation
    InvalidState { message: String },
    /// Cancel arrived after the gateway had already captured the funds
    AlreadyCaptured { payment_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfrastructureError {
    Store { message: String, is_retryable: bool },
    Configuration { message: String },
    Internal { message: String },
}

/// Failures reported by, or on the way to, the payment gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalError {
    GatewayUnauthorized { message: String },
    GatewayRejected { status: u16, message: String },
    GatewayFailure { message: String, is_retryable: bool },
    GatewayUnavailable,
    Timeout { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidField { field: Option<String>, reason: String },
    InvalidSignature { reason: String },
    MalformedBody { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
            payment_status: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_payment_status(mut self, status: Option<PaymentStatus>) -> Self {
        self.payment_status = status;
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::InvalidState { .. } => 409,
                DomainError::AlreadyCaptured { .. } => 409,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayUnauthorized { .. } => 502,
                ExternalError::GatewayRejected { .. } => 422,
                ExternalError::GatewayFailure { .. } => 502,
                ExternalError::GatewayUnavailable => 503,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::InvalidState { .. } => ErrorCode::InvalidPaymentState,
                DomainError::AlreadyCaptured { .. } => ErrorCode::PaymentAlreadyCaptured,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Store { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::Internal { .. } => ErrorCode::InternalError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayUnauthorized { .. } => ErrorCode::GatewayUnauthorized,
                ExternalError::GatewayRejected { .. } => ErrorCode::GatewayRejected,
                ExternalError::GatewayFailure { .. } => ErrorCode::GatewayError,
                ExternalError::GatewayUnavailable => ErrorCode::GatewayUnavailable,
                ExternalError::Timeout { .. } => ErrorCode::GatewayTimeout,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidSignature { .. } => ErrorCode::InvalidSignature,
                _ => ErrorCode::ValidationError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { payment_id } => {
                    format!("Payment '{}' not found", payment_id)
                }
                DomainError::InvalidState { message } => message.clone(),
                DomainError::AlreadyCaptured { .. } => {
                    "Cannot cancel payment: already captured".to_string()
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayUnauthorized { .. } => {
                    "Payment gateway rejected our credentials. Please contact support".to_string()
                }
                ExternalError::GatewayRejected { message, .. } => {
                    format!("Payment gateway refused the request: {}", message)
                }
                ExternalError::GatewayFailure { is_retryable, .. } => {
                    if *is_retryable {
                        "Payment gateway is temporarily unavailable. Please try again".to_string()
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::GatewayUnavailable => {
                    "Payment gateway is unavailable. Please try again shortly".to_string()
                }
                ExternalError::Timeout { reason } => {
                    format!("Payment request did not complete: {}", reason)
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidField { field, reason } => match field {
                    Some(field) => format!("Invalid '{}': {}", field, reason),
                    None => reason.clone(),
                },
                ValidationError::InvalidSignature { .. } => {
                    "Invalid webhook signature".to_string()
                }
                ValidationError::MalformedBody { reason } => {
                    format!("Malformed request body: {}", reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Store { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
                InfrastructureError::Internal { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayUnauthorized { .. } => false,
                ExternalError::GatewayRejected { .. } => false,
                ExternalError::GatewayFailure { is_retryable, .. } => *is_retryable,
                ExternalError::GatewayUnavailable => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let kind = match err {
            PaymentError::Validation { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field,
                    reason: message,
                })
            }
            other => AppErrorKind::Domain(DomainError::InvalidState {
                message: other.user_message(),
            }),
        };
        AppError::new(kind)
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let kind = match err {
            GatewayError::Unauthorized { message } => {
                ExternalError::GatewayUnauthorized { message }
            }
            GatewayError::Client {
                status, message, ..
            } => ExternalError::GatewayRejected { status, message },
            GatewayError::Server { .. } | GatewayError::Unclassified { .. } => {
                ExternalError::GatewayFailure {
                    message: err.to_string(),
                    is_retryable: true,
                }
            }
            GatewayError::Unavailable => ExternalError::GatewayUnavailable,
            GatewayError::Cancelled { reason } => ExternalError::Timeout {
                reason: reason.to_string(),
            },
        };
        AppError::new(AppErrorKind::External(kind))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let kind = match err {
            StoreError::NotFound { key, .. } => {
                AppErrorKind::Domain(DomainError::PaymentNotFound { payment_id: key })
            }
            other => AppErrorKind::Infrastructure(InfrastructureError::Store {
                is_retryable: other.is_retryable(),
                message: other.to_string(),
            }),
        };
        AppError::new(kind)
    }
}

impl From<Interrupt> for AppError {
    fn from(reason: Interrupt) -> Self {
        AppError::new(AppErrorKind::External(ExternalError::Timeout {
            reason: reason.to_string(),
        }))
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
