use crate::payments::error::{GatewayError, GatewayResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Thin reqwest wrapper that turns every gateway answer into either a typed
/// body or a classified [`GatewayError`]. It never retries.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unclassified {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }

    pub async fn request_form<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: &str,
        form: &[(&str, String)],
        additional_headers: &[(&str, &str)],
    ) -> GatewayResult<T> {
        let mut request = self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .bearer_auth(bearer_token);
        for (k, v) in additional_headers {
            request = request.header(*k, *v);
        }
        if !form.is_empty() {
            request = request.form(form);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Unclassified {
                message: format!("gateway request failed: {}", e),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Unclassified {
                message: format!("failed to read gateway response: {}", e),
            })?;

        if status.is_success() {
            return serde_json::from_str::<T>(&text).map_err(|e| GatewayError::Unclassified {
                message: format!("invalid gateway JSON response: {}", e),
            });
        }

        debug!(status = %status, url = %url, "gateway returned error status");
        Err(classify_status(status.as_u16(), &text))
    }
}

#[derive(Debug, Deserialize)]
struct GatewayErrorEnvelope {
    error: GatewayErrorBody,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Maps a non-success HTTP answer onto the gateway error taxonomy.
pub fn classify_status(status: u16, body: &str) -> GatewayError {
    let parsed = serde_json::from_str::<GatewayErrorEnvelope>(body).ok();
    let code = parsed.as_ref().and_then(|e| e.error.code.clone());
    let message = parsed
        .and_then(|e| e.error.message)
        .filter(|m| !m.trim().is_empty());

    match status {
        401 => GatewayError::Unauthorized {
            message: message.unwrap_or_else(|| "gateway unauthorized".to_string()),
        },
        400..=499 => GatewayError::Client {
            status,
            code,
            message: message.unwrap_or_else(|| "gateway request error".to_string()),
        },
        500..=599 => GatewayError::Server {
            status,
            message: message.unwrap_or_else(|| format!("HTTP {}", status)),
        },
        _ => GatewayError::Unclassified {
            message: format!("unexpected gateway status {}", status),
        },
    }
}

pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
