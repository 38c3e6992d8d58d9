use crate::context::Interrupt;
use crate::payments::types::{PaymentOperation, PaymentStatus};
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway code returned when an intent is not in the state the call expects
/// (e.g. canceling an intent that was already captured).
pub const UNEXPECTED_STATE_CODE: &str = "payment_intent_unexpected_state";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("{message}")]
    GuardViolation {
        operation: PaymentOperation,
        status: PaymentStatus,
        message: String,
    },

    #[error("Payment {payment_id} has no gateway reference")]
    MissingGatewayReference { payment_id: String },

    #[error("Payment {payment_id} is already linked to gateway intent {existing}")]
    GatewayIdAlreadySet { payment_id: String, existing: String },
}

impl PaymentError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::Validation { .. } => 400,
            PaymentError::InvalidTransition { .. } => 409,
            PaymentError::GuardViolation { .. } => 409,
            PaymentError::MissingGatewayReference { .. } => 409,
            PaymentError::GatewayIdAlreadySet { .. } => 409,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Validation { message, .. } => message.clone(),
            PaymentError::GuardViolation { message, .. } => message.clone(),
            PaymentError::InvalidTransition { from, to } => {
                format!("Payment cannot move from {} to {}", from, to)
            }
            PaymentError::MissingGatewayReference { .. } => {
                "Payment has not been registered with the gateway".to_string()
            }
            PaymentError::GatewayIdAlreadySet { .. } => {
                "Payment is already linked to a different gateway intent".to_string()
            }
        }
    }
}

/// Closed classification of everything a gateway call can end with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Credentials rejected (401). Fatal, never retried.
    #[error("gateway unauthorized: {message}")]
    Unauthorized { message: String },

    /// Any other 4xx: the request itself was refused.
    #[error("gateway request error ({status}): {message}")]
    Client {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("gateway server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Transport failures and timeouts: no HTTP answer to classify.
    #[error("gateway transport error: {message}")]
    Unclassified { message: String },

    #[error("gateway unavailable: circuit breaker open")]
    Unavailable,

    #[error("gateway call interrupted: {reason}")]
    Cancelled { reason: Interrupt },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Server { .. } | GatewayError::Unclassified { .. }
        )
    }

    /// Whether this outcome says the gateway is unhealthy.
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Server { .. } | GatewayError::Unclassified { .. }
        )
    }

    pub fn is_unexpected_state(&self) -> bool {
        matches!(
            self,
            GatewayError::Client { code: Some(code), .. } if code == UNEXPECTED_STATE_CODE
        )
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            GatewayError::Unauthorized { .. } => 502,
            GatewayError::Client { .. } => 422,
            GatewayError::Server { .. } => 502,
            GatewayError::Unclassified { .. } => 502,
            GatewayError::Unavailable => 503,
            GatewayError::Cancelled { .. } => 504,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Unauthorized { .. } => {
                "Payment gateway rejected our credentials. Please contact support".to_string()
            }
            GatewayError::Client { message, .. } => {
                format!("Payment gateway refused the request: {}", message)
            }
            GatewayError::Server { .. } | GatewayError::Unclassified { .. } => {
                "Payment gateway is temporarily unavailable. Please try again".to_string()
            }
            GatewayError::Unavailable => {
                "Payment gateway is unavailable. Please try again shortly".to_string()
            }
            GatewayError::Cancelled { reason } => {
                format!("Payment gateway call did not finish: {}", reason)
            }
        }
    }
}
