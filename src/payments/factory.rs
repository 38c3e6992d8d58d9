use crate::config::{ConfigError, GatewayConfig, GatewayKind, ResilienceConfig};
use crate::payments::client::GatewayClient;
use crate::payments::provider::PaymentGateway;
use crate::payments::providers::{MockGateway, StripeGateway};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds gateway clients from configuration.
pub struct GatewayFactory {
    gateway: GatewayConfig,
    resilience: ResilienceConfig,
}

impl GatewayFactory {
    pub fn new(gateway: GatewayConfig, resilience: ResilienceConfig) -> Self {
        Self {
            gateway,
            resilience,
        }
    }

    pub fn transport(&self) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
        match self.gateway.kind {
            GatewayKind::Stripe => {
                let config = self.gateway.stripe.clone().ok_or_else(|| {
                    ConfigError::MissingVariable("STRIPE_SECRET_KEY".to_string())
                })?;
                let gateway = StripeGateway::new(config).map_err(|e| {
                    ConfigError::ValidationFailed(format!("stripe client setup failed: {}", e))
                })?;
                Ok(Arc::new(gateway))
            }
            GatewayKind::Mock => {
                warn!("Using in-process mock gateway; no real charges will be made");
                Ok(Arc::new(MockGateway::new()))
            }
        }
    }

    /// Wraps the configured transport with the breaker and retry policy.
    pub fn client(&self) -> Result<GatewayClient, ConfigError> {
        let transport = self.transport()?;
        info!(
            gateway = transport.name(),
            failure_threshold = self.resilience.failure_threshold,
            cooldown_secs = self.resilience.cooldown,
            retry_max_attempts = self.resilience.retry_max_attempts,
            "Payment gateway client configured"
        );
        Ok(GatewayClient::new(
            transport,
            self.resilience.breaker_config(),
            self.resilience.retry_policy(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::circuit_breaker::CircuitState;
    use crate::payments::providers::stripe::StripeConfig;

    fn resilience() -> ResilienceConfig {
        ResilienceConfig {
            failure_threshold: 3,
            cooldown: 10,
            half_open_max_requests: 2,
            retry_max_attempts: 3,
            retry_initial_backoff: 100,
        }
    }

    #[test]
    fn test_mock_client() {
        let factory = GatewayFactory::new(
            GatewayConfig {
                kind: GatewayKind::Mock,
                stripe: None,
            },
            resilience(),
        );
        let client = factory.client().unwrap();
        assert_eq!(client.name(), "mock");
        assert_eq!(client.breaker().state(), CircuitState::Closed);
    }

    #[test]
    fn test_stripe_client() {
        let factory = GatewayFactory::new(
            GatewayConfig {
                kind: GatewayKind::Stripe,
                stripe: Some(StripeConfig {
                    secret_key: "sk_test_123".to_string(),
                    ..StripeConfig::default()
                }),
            },
            resilience(),
        );
        assert_eq!(factory.client().unwrap().name(), "stripe");
    }

    #[test]
    fn test_stripe_without_config_fails() {
        let factory = GatewayFactory::new(
            GatewayConfig {
                kind: GatewayKind::Stripe,
                stripe: None,
            },
            resilience(),
        );
        assert!(matches!(
            factory.client(),
            Err(ConfigError::MissingVariable(_))
        ));
    }
}
