pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;
pub mod webhook;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{GatewayClient, RetryPolicy};
pub use error::{GatewayError, GatewayResult, PaymentError, PaymentResult};
pub use factory::GatewayFactory;
pub use provider::{IntentRequest, IntentResponse, PaymentGateway, RefundResponse};
pub use types::{NewPayment, Payment, PaymentOperation, PaymentStatus, Transition};
