//! # Stripe Webhook Verification & Decoding
//!
//! Deliveries are authenticated first (HMAC-SHA256 over `t.payload` with the
//! endpoint's signing secret, timestamp bounded, constant-time compare) and
//! then decoded exactly once into the closed [`GatewayEvent`] union. Event
//! types this system does not act on decode to `Unhandled` so new gateway
//! event types never break the pipeline.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use shop_core::{GatewayEvent, ShopError, ShopResult};
use tracing::debug;

/// Accepted clock skew between the signature timestamp and now, seconds
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Verify a delivery's signature and decode its event
pub fn verify_and_decode(
    webhook_secret: &str,
    payload: &[u8],
    signature: &str,
) -> ShopResult<GatewayEvent> {
    verify_signature(webhook_secret, payload, signature, Utc::now().timestamp())?;
    decode_event(payload)
}

/// Check the `Stripe-Signature` header against the payload
pub fn verify_signature(
    webhook_secret: &str,
    payload: &[u8],
    signature: &str,
    now: i64,
) -> ShopResult<()> {
    let sig_parts = parse_signature_header(signature)?;

    if (now - sig_parts.timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(ShopError::WebhookVerificationFailed(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let signed_payload = format!(
        "{}.{}",
        sig_parts.timestamp,
        String::from_utf8_lossy(payload)
    );
    let expected_sig = compute_hmac_sha256(webhook_secret, &signed_payload);

    let valid = sig_parts
        .signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected_sig));

    if !valid {
        return Err(ShopError::WebhookVerificationFailed(
            "Signature mismatch".to_string(),
        ));
    }

    Ok(())
}

/// Decode a verified payload into the event union
pub fn decode_event(payload: &[u8]) -> ShopResult<GatewayEvent> {
    let event: StripeWebhookEvent = serde_json::from_slice(payload)
        .map_err(|e| ShopError::WebhookParse(format!("Failed to parse webhook: {}", e)))?;

    debug!(event_type = %event.event_type, event_id = %event.id, "decoding Stripe webhook");

    let object = &event.data.object;
    let decoded = match event.event_type.as_str() {
        "checkout.session.completed" => GatewayEvent::CheckoutCompleted {
            session_id: required_str(object, "id")?,
            payment_status: optional_str(object, "payment_status")
                .unwrap_or_else(|| "unknown".to_string()),
        },
        "checkout.session.expired" => GatewayEvent::CheckoutExpired {
            session_id: required_str(object, "id")?,
        },
        "checkout.session.async_payment_failed" => GatewayEvent::PaymentFailed {
            session_id: required_str(object, "id")?,
        },
        "charge.updated" => GatewayEvent::ChargeUpdated {
            charge_id: required_str(object, "id")?,
            status: optional_str(object, "status").unwrap_or_else(|| "unknown".to_string()),
        },
        other => GatewayEvent::Unhandled {
            raw_type: other.to_string(),
        },
    };

    Ok(decoded)
}

fn required_str(object: &serde_json::Map<String, Value>, key: &str) -> ShopResult<String> {
    object
        .get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ShopError::WebhookParse(format!("Missing {} in event object", key)))
}

fn optional_str(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(|v| v.as_str()).map(String::from)
}

// =============================================================================
// Stripe Event Envelope
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Map<String, Value>,
}

// =============================================================================
// Signature Verification
// =============================================================================

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> ShopResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let kv: Vec<&str> = part.split('=').collect();
        if kv.len() != 2 {
            continue;
        }
        match kv[0] {
            "t" => {
                timestamp = kv[1].parse().ok();
            }
            "v1" => {
                signatures.push(kv[1].to_string());
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ShopError::WebhookVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(ShopError::WebhookVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn compute_hmac_sha256(secret: &str, message: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Build a valid `Stripe-Signature` header for a payload (test support)
#[doc(hidden)]
pub fn sign_payload(webhook_secret: &str, payload: &[u8], timestamp: i64) -> String {
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let sig = compute_hmac_sha256(webhook_secret, &signed_payload);
    format!("t={},v1={}", timestamp, sig)
}
