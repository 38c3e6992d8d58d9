use crate::config::ConfigError;
use crate::payments::error::GatewayResult;
use crate::payments::provider::{IntentRequest, IntentResponse, PaymentGateway, RefundResponse};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl StripeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| ConfigError::MissingVariable("STRIPE_SECRET_KEY".to_string()))?;

        Ok(Self {
            base_url: std::env::var("STRIPE_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            timeout_secs: std::env::var("STRIPE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            secret_key,
        })
    }
}

/// HTTP transport to a Stripe-compatible payment-intents API.
pub struct StripeGateway {
    config: StripeConfig,
    http: PaymentHttpClient,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> GatewayResult<Self> {
        let http = PaymentHttpClient::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn intent_form(request: &IntentRequest) -> Vec<(&'static str, String)> {
        vec![
            ("amount", request.amount.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("receipt_email", request.email.clone()),
            ("payment_method", request.payment_method.clone()),
            ("capture_method", "manual".to_string()),
            ("confirm", "true".to_string()),
            ("metadata[payment_id]", request.payment_id.clone()),
        ]
    }

    async fn post_intent(&self, path: &str) -> GatewayResult<IntentResponse> {
        let raw: StripeIntent = self
            .http
            .request_form(
                reqwest::Method::POST,
                &self.endpoint(path),
                &self.config.secret_key,
                &[],
                &[],
            )
            .await?;
        Ok(raw.into())
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> GatewayResult<IntentResponse> {
        let form = Self::intent_form(request);
        let mut headers = Vec::new();
        if let Some(key) = request.idempotency_key.as_deref() {
            headers.push(("Idempotency-Key", key));
        }

        let raw: StripeIntent = self
            .http
            .request_form(
                reqwest::Method::POST,
                &self.endpoint("/v1/payment_intents"),
                &self.config.secret_key,
                &form,
                &headers,
            )
            .await?;

        info!(
            payment_id = %request.payment_id,
            intent_id = %raw.id,
            status = %raw.status,
            "stripe payment intent created"
        );
        Ok(raw.into())
    }

    async fn capture(&self, intent_id: &str) -> GatewayResult<IntentResponse> {
        self.post_intent(&format!("/v1/payment_intents/{}/capture", intent_id))
            .await
    }

    async fn cancel(&self, intent_id: &str) -> GatewayResult<IntentResponse> {
        self.post_intent(&format!("/v1/payment_intents/{}/cancel", intent_id))
            .await
    }

    async fn refund(&self, intent_id: &str, amount: i64) -> GatewayResult<RefundResponse> {
        let form = vec![
            ("payment_intent", intent_id.to_string()),
            ("amount", amount.to_string()),
        ];
        let raw: StripeRefund = self
            .http
            .request_form(
                reqwest::Method::POST,
                &self.endpoint("/v1/refunds"),
                &self.config.secret_key,
                &form,
                &[],
            )
            .await?;

        Ok(RefundResponse {
            id: raw.id,
            intent_id: raw.payment_intent.unwrap_or_else(|| intent_id.to_string()),
            status: raw.status,
            amount: raw.amount,
        })
    }

    fn name(&self) -> &'static str {
        "stripe"
    }
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
    amount: Option<i64>,
}

impl From<StripeIntent> for IntentResponse {
    fn from(raw: StripeIntent) -> Self {
        Self {
            id: raw.id,
            status: raw.status,
            amount: raw.amount,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: String,
    amount: i64,
    payment_intent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> StripeGateway {
        StripeGateway::new(StripeConfig {
            secret_key: "sk_test".to_string(),
            base_url: "https://api.stripe.test/".to_string(),
            timeout_secs: 5,
        })
        .expect("gateway init should succeed")
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            gateway().endpoint("/v1/refunds"),
            "https://api.stripe.test/v1/refunds"
        );
    }

    #[test]
    fn intent_form_requests_manual_capture() {
        let form = StripeGateway::intent_form(&IntentRequest {
            payment_id: "p1".to_string(),
            amount: 2500,
            currency: "USD".to_string(),
            email: "a@b.com".to_string(),
            payment_method: "pm_card_visa".to_string(),
            idempotency_key: None,
        });
        assert!(form.contains(&("capture_method", "manual".to_string())));
        assert!(form.contains(&("confirm", "true".to_string())));
        assert!(form.contains(&("currency", "usd".to_string())));
        assert!(form.contains(&("amount", "2500".to_string())));
    }

    #[test]
    fn intent_json_parses() {
        let raw: StripeIntent = serde_json::from_str(
            r#"{"id":"pi_1","object":"payment_intent","status":"requires_capture","amount":100}"#,
        )
        .unwrap();
        let intent: IntentResponse = raw.into();
        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.amount, Some(100));
    }
}
