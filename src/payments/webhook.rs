//! Signed gateway event verification and parsing.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`
//! where each `v1` is `HMAC-SHA256(secret, "<t>.<raw body>")`. A delivery is
//! accepted when any `v1` matches and `t` is within the tolerance window.

use crate::payments::utils::{hmac_sha256_hex, secure_eq};
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub const EVENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    NotConfigured,

    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance ({age_secs}s)")]
    TimestampOutOfTolerance { age_secs: i64 },

    #[error("no signature matches the payload")]
    SignatureMismatch,

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        if self.secret.is_empty() {
            return Err(WebhookError::NotConfigured);
        }
        if header.trim().is_empty() {
            return Err(WebhookError::MissingSignature);
        }

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| WebhookError::MalformedHeader)?,
                    )
                }
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }

        let age_secs = now - timestamp;
        if self.tolerance_secs > 0 && age_secs.abs() > self.tolerance_secs {
            return Err(WebhookError::TimestampOutOfTolerance { age_secs });
        }

        let expected = self.expected_signature(payload, timestamp)?;
        if signatures
            .iter()
            .any(|candidate| secure_eq(expected.as_bytes(), candidate.as_bytes()))
        {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }

    /// Builds a header value for `payload` signed at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let signature = self.expected_signature(payload, timestamp)?;
        Ok(format!("t={},v1={}", timestamp, signature))
    }

    fn expected_signature(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let mut signed = format!("{}.", timestamp).into_bytes();
        signed.extend_from_slice(payload);
        hmac_sha256_hex(self.secret.as_bytes(), &signed).ok_or(WebhookError::NotConfigured)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Succeeded,
    Failed,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Succeeded => EVENT_INTENT_SUCCEEDED,
            EventKind::Failed => EVENT_INTENT_FAILED,
            EventKind::Other(kind) => kind,
        }
    }
}

/// A verified gateway notification reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEvent {
    pub id: String,
    pub kind: EventKind,
    pub intent_id: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: Option<RawEventData>,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: RawEventObject,
}

#[derive(Debug, Deserialize)]
struct RawEventObject {
    id: Option<String>,
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Debug, Deserialize)]
struct RawPaymentError {
    message: Option<String>,
}

pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent, WebhookError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

    let kind = match raw.event_type.as_str() {
        EVENT_INTENT_SUCCEEDED => EventKind::Succeeded,
        EVENT_INTENT_FAILED => EventKind::Failed,
        other => EventKind::Other(other.to_string()),
    };

    let object = raw.data.map(|d| d.object);
    let intent_id = object
        .as_ref()
        .and_then(|o| o.id.clone())
        .filter(|id| !id.trim().is_empty());
    let failure_message = object
        .and_then(|o| o.last_payment_error)
        .and_then(|e| e.message);

    if intent_id.is_none() && !matches!(kind, EventKind::Other(_)) {
        return Err(WebhookError::MalformedPayload(
            "payment intent event without data.object.id".to_string(),
        ));
    }

    Ok(GatewayEvent {
        id: raw.id,
        kind,
        intent_id,
        failure_message,
    })
}
