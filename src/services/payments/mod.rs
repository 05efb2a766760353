use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::errors::ServiceError;

pub mod provider;

pub use provider::HttpPaymentGateway;

type HmacSha256 = Hmac<Sha256>;

/// Parameters for opening a hosted payment session with the provider.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeSessionRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub customer_email: String,
    pub callback_url: String,
}

/// Redirect target and the provider's reference for the opened session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub redirect_url: String,
    pub session_reference: String,
}

/// Result of asking the provider what happened to a session. The amount is
/// in the gateway's minor-unit representation; callers compare it against
/// the order total converted with [`to_minor_units`] and treat any mismatch
/// as a failed verification.
#[derive(Debug, Clone)]
pub struct Verification {
    pub succeeded: bool,
    pub amount_minor: i64,
    pub authorization_token: Option<String>,
}

/// Provider-agnostic payment gateway interface. Both calls may be slow or
/// unavailable; callers must not hold any lock or open transaction while
/// awaiting them.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_session(
        &self,
        request: InitializeSessionRequest,
    ) -> Result<GatewaySession, ServiceError>;

    async fn verify(&self, session_reference: &str) -> Result<Verification, ServiceError>;

    fn verify_webhook_signature(&self, payload: &[u8], signature_header: &str) -> bool;
}

/// Converts a major-unit decimal amount to the gateway's minor units.
/// Rejects amounts with sub-minor-unit remainders instead of rounding:
/// a snapshot price that cannot be represented exactly must never be
/// silently altered on its way to the provider.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let minor = amount * Decimal::ONE_HUNDRED;
    if !minor.fract().is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "Amount {} is not representable in minor units",
            amount
        )));
    }
    minor.to_i64().ok_or_else(|| {
        ServiceError::ValidationError(format!("Amount {} overflows minor units", amount))
    })
}

/// Computes the webhook signature for a timestamped payload:
/// hex(HMAC-SHA256(secret, "{timestamp}.{payload}")).
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a `t=<unix>,v1=<hex>` signature header for a payload. Used by the
/// provider simulator in tests and exposed for tooling.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={},v1={}", timestamp, sign_payload(secret, timestamp, payload))
}

/// Verifies a `t=,v1=` signature header against the raw payload. Rejects
/// timestamps older than the tolerance window.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
    tolerance_secs: u64,
    now: DateTime<Utc>,
) -> bool {
    let mut timestamp = "";
    let mut signature = "";
    for part in signature_header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => timestamp = val,
            (Some("v1"), Some(val)) => signature = val,
            _ => {}
        }
    }
    if timestamp.is_empty() || signature.is_empty() {
        return false;
    }

    let ts = match timestamp.parse::<i64>() {
        Ok(ts) => ts,
        Err(_) => return false,
    };
    if (now.timestamp() - ts).unsigned_abs() > tolerance_secs {
        return false;
    }

    let expected = sign_payload(secret, ts, payload);
    constant_time_eq(&expected, signature)
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_units_conversion_is_exact() {
        assert_eq!(to_minor_units(dec!(2000)).unwrap(), 200_000);
        assert_eq!(to_minor_units(dec!(19.99)).unwrap(), 1999);
        assert_eq!(to_minor_units(dec!(0)).unwrap(), 0);
    }

    #[test]
    fn minor_units_conversion_rejects_sub_minor_remainders() {
        assert!(to_minor_units(dec!(10.005)).is_err());
    }

    #[test]
    fn signature_round_trip_verifies() {
        let secret = "whsec_test123";
        let payload = br#"{"event":"charge.success","reference":"ref_1"}"#;
        let now = Utc::now();
        let header = signature_header(secret, now.timestamp(), payload);

        assert!(verify_signature(secret, payload, &header, 300, now));
    }

    #[test]
    fn signature_rejects_tampered_payload() {
        let secret = "whsec_test123";
        let now = Utc::now();
        let header = signature_header(secret, now.timestamp(), b"original");

        assert!(!verify_signature(secret, b"tampered", &header, 300, now));
    }

    #[test]
    fn signature_rejects_wrong_secret() {
        let now = Utc::now();
        let header = signature_header("secret-a", now.timestamp(), b"payload");

        assert!(!verify_signature("secret-b", b"payload", &header, 300, now));
    }

    #[test]
    fn signature_rejects_stale_timestamp() {
        let secret = "whsec_test123";
        let now = Utc::now();
        let stale = now.timestamp() - 600;
        let header = signature_header(secret, stale, b"payload");

        assert!(!verify_signature(secret, b"payload", &header, 300, now));
    }

    #[test]
    fn signature_rejects_malformed_header() {
        let now = Utc::now();
        assert!(!verify_signature("s", b"p", "", 300, now));
        assert!(!verify_signature("s", b"p", "v1=abc", 300, now));
        assert!(!verify_signature("s", b"p", "t=notanumber,v1=abc", 300, now));
    }
}
