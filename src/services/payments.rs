use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Checkout session handle returned by the payment processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
}

/// A verified inbound notification from the payment processor.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub id: Option<String>,
    pub event_type: String,
    session_id: Option<String>,
}

impl GatewayEvent {
    /// Correlation id joining the event back to an order's checkout session.
    pub fn session_id(&self) -> Result<&str, ServiceError> {
        self.session_id.as_deref().ok_or_else(|| {
            ServiceError::ValidationError("correlation id missing from gateway event".to_string())
        })
    }
}

/// External payment processor seam.
///
/// The processor is a trusted black box: this trait only covers session
/// creation, notification authenticity, and correlation-id plumbing.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a checkout session for one order's payment attempt.
    async fn create_session(
        &self,
        order_id: Uuid,
        amount_minor_units: i64,
        currency: &str,
        customer_email: &str,
    ) -> Result<CheckoutSession, ServiceError>;

    /// Verifies an inbound notification against the raw payload before
    /// trusting any field of it.
    fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, ServiceError>;
}

/// Converts a decimal amount to integer minor currency units by a single
/// multiply-then-truncate. Callers depend on truncation, not rounding.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100)).trunc().to_i64().ok_or_else(|| {
        ServiceError::ValidationError(format!("amount {} out of range for minor units", amount))
    })
}

/// Computes the hex HMAC for a `{timestamp}.{body}` signed payload.
pub fn sign_payload(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a `t=<unix>,v1=<hex>` signature header against the raw payload.
fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
    tolerance_secs: u64,
) -> Result<(), ServiceError> {
    let mut ts = "";
    let mut v1 = "";
    for part in signature_header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }

    if ts.is_empty() || v1.is_empty() {
        return Err(ServiceError::SignatureInvalid(
            "missing timestamp or signature element".to_string(),
        ));
    }

    let ts_i = ts.parse::<i64>().map_err(|_| {
        ServiceError::SignatureInvalid("malformed signature timestamp".to_string())
    })?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return Err(ServiceError::SignatureInvalid(
            "signature timestamp outside tolerance".to_string(),
        ));
    }

    let expected = sign_payload(secret, ts, payload);
    if !constant_time_eq(&expected, v1) {
        return Err(ServiceError::SignatureInvalid(
            "signature mismatch".to_string(),
        ));
    }

    Ok(())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

fn parse_event(payload: &[u8]) -> Result<GatewayEvent, ServiceError> {
    let json: Value = serde_json::from_slice(payload)
        .map_err(|e| ServiceError::ValidationError(format!("invalid event payload: {}", e)))?;

    let event_type = json
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::ValidationError("event type missing".to_string()))?
        .to_string();

    let session_id = json
        .get("data")
        .and_then(|d| d.get("session_id"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(GatewayEvent {
        id: json.get("id").and_then(|v| v.as_str()).map(str::to_string),
        event_type,
        session_id,
    })
}

/// Production gateway adapter talking to the processor over HTTP.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    webhook_secret: Option<String>,
    tolerance_secs: u64,
    success_url: String,
    cancel_url: String,
}

impl HttpPaymentGateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        webhook_secret: Option<String>,
        tolerance_secs: u64,
        timeout: Duration,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url,
            api_key,
            webhook_secret,
            tolerance_secs,
            success_url,
            cancel_url,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, customer_email))]
    async fn create_session(
        &self,
        order_id: Uuid,
        amount_minor_units: i64,
        currency: &str,
        customer_email: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let body = json!({
            "mode": "payment",
            "amount": amount_minor_units,
            "currency": currency.to_lowercase(),
            "customer_email": customer_email,
            "success_url": format!("{}?session_id={{CHECKOUT_SESSION_ID}}", self.success_url),
            "cancel_url": self.cancel_url,
            "metadata": { "order_id": order_id.to_string() },
        });

        let mut request = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("session create failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewayError(format!(
                "session create returned {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("malformed session response: {}", e)))?;

        let session_id = payload
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServiceError::GatewayError("session id missing".to_string()))?
            .to_string();
        let redirect_url = payload
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServiceError::GatewayError("redirect url missing".to_string()))?
            .to_string();

        info!("Created checkout session {} for order {}", session_id, order_id);
        Ok(CheckoutSession {
            session_id,
            redirect_url,
        })
    }

    fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, ServiceError> {
        if let Some(secret) = &self.webhook_secret {
            verify_signature(secret, payload, signature_header, self.tolerance_secs)?;
        }
        parse_event(payload)
    }
}

/// Local gateway used when no processor URL is configured: sessions are
/// fabricated in-process and always succeed. Notification verification is
/// identical to the HTTP adapter.
pub struct SandboxPaymentGateway {
    webhook_secret: Option<String>,
    tolerance_secs: u64,
    success_url: String,
}

impl SandboxPaymentGateway {
    pub fn new(webhook_secret: Option<String>, tolerance_secs: u64, success_url: String) -> Self {
        Self {
            webhook_secret,
            tolerance_secs,
            success_url,
        }
    }
}

#[async_trait]
impl PaymentGateway for SandboxPaymentGateway {
    async fn create_session(
        &self,
        order_id: Uuid,
        amount_minor_units: i64,
        _currency: &str,
        _customer_email: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let session_id = format!("cs_sandbox_{}", Uuid::new_v4().simple());
        info!(
            "Sandbox checkout session {} for order {} ({} minor units)",
            session_id, order_id, amount_minor_units
        );
        Ok(CheckoutSession {
            redirect_url: format!("{}?session_id={}", self.success_url, session_id),
            session_id,
        })
    }

    fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, ServiceError> {
        if let Some(secret) = &self.webhook_secret {
            verify_signature(secret, payload, signature_header, self.tolerance_secs)?;
        }
        parse_event(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_units_truncate_instead_of_rounding() {
        assert_eq!(to_minor_units(dec!(41.97)).unwrap(), 4197);
        assert_eq!(to_minor_units(dec!(10.999)).unwrap(), 1099);
        assert_eq!(to_minor_units(dec!(0.009)).unwrap(), 0);
        assert_eq!(to_minor_units(dec!(12.00)).unwrap(), 1200);
    }

    #[test]
    fn signature_roundtrip_verifies() {
        let secret = "whsec_test";
        let body = br#"{"type":"checkout.session.completed","data":{"session_id":"cs_1"}}"#;
        let ts = chrono::Utc::now().timestamp().to_string();
        let sig = sign_payload(secret, &ts, body);
        let header = format!("t={},v1={}", ts, sig);

        assert!(verify_signature(secret, body, &header, 300).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let secret = "whsec_test";
        let body = br#"{"type":"checkout.session.completed"}"#;
        let ts = chrono::Utc::now().timestamp().to_string();
        let sig = sign_payload(secret, &ts, body);
        let header = format!("t={},v1={}", ts, sig);

        let err = verify_signature(secret, b"{\"type\":\"other\"}", &header, 300).unwrap_err();
        assert!(matches!(err, ServiceError::SignatureInvalid(_)));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let secret = "whsec_test";
        let body = b"{}";
        let ts = (chrono::Utc::now().timestamp() - 4000).to_string();
        let sig = sign_payload(secret, &ts, body);
        let header = format!("t={},v1={}", ts, sig);

        let err = verify_signature(secret, body, &header, 300).unwrap_err();
        assert!(matches!(err, ServiceError::SignatureInvalid(_)));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let err = verify_signature("s", b"{}", "v1=deadbeef", 300).unwrap_err();
        assert!(matches!(err, ServiceError::SignatureInvalid(_)));
    }

    #[test]
    fn event_parsing_extracts_correlation() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"session_id":"cs_42"}}"#;
        let event = parse_event(payload).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.session_id().unwrap(), "cs_42");
        assert_eq!(event.id.as_deref(), Some("evt_1"));
    }

    #[test]
    fn event_without_correlation_fails_extraction() {
        let payload = br#"{"type":"checkout.session.completed","data":{}}"#;
        let event = parse_event(payload).unwrap();
        assert!(matches!(
            event.session_id(),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn sandbox_sessions_embed_the_session_id_in_the_redirect() {
        let gateway = SandboxPaymentGateway::new(
            None,
            300,
            "http://localhost:8080/api/v1/orders/confirm".to_string(),
        );
        let session = gateway
            .create_session(Uuid::new_v4(), 4197, "USD", "a@b.c")
            .await
            .unwrap();
        assert!(session.session_id.starts_with("cs_sandbox_"));
        assert!(session.redirect_url.contains(&session.session_id));
    }
}
