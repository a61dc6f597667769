use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::db::repositories::{InvoiceRepository, WebhookEventRepository};
use crate::error::AppError;
use crate::models::InvoiceProviderKind;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Checks a `Stripe-Signature` header (`t=<ts>,v1=<hex>[,v1=...]`) against the payload.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &str,
    signature: &str,
    now_unix: i64,
) -> Result<(), AppError> {
    let mut timestamp = "";
    let mut signatures = Vec::new();

    for element in signature.split(',') {
        if let Some(t) = element.trim().strip_prefix("t=") {
            timestamp = t;
        } else if let Some(s) = element.trim().strip_prefix("v1=") {
            signatures.push(s);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err(AppError::Auth("Invalid signature format".to_string()));
    }

    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| AppError::Auth("Invalid signature timestamp".to_string()))?;
    if now_unix.abs_diff(signed_at) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(AppError::Auth("Webhook signature timestamp outside tolerance".to_string()));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC error: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if signatures
        .iter()
        .any(|candidate| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())))
    {
        Ok(())
    } else {
        Err(AppError::Auth("Signature verification failed".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Clone)]
pub struct StripeWebhookService {
    secret: Option<String>,
    invoices: InvoiceRepository,
    events: WebhookEventRepository,
}

impl StripeWebhookService {
    pub fn new(secret: Option<String>, invoices: InvoiceRepository, events: WebhookEventRepository) -> Self {
        Self {
            secret,
            invoices,
            events,
        }
    }

    /// Verifies and applies one webhook delivery. Redeliveries of a processed event are no-ops.
    pub async fn handle(&self, payload: &str, signature: &str) -> Result<(), AppError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| AppError::Configuration("STRIPE_WEBHOOK_SECRET must be set".to_string()))?;
        verify_webhook_signature(secret, payload, signature, chrono::Utc::now().timestamp())?;

        let event: StripeEvent = serde_json::from_str(payload)
            .map_err(|e| AppError::BadRequest(format!("Failed to parse event: {}", e)))?;

        if !self.events.record_if_new(&event.id, &event.event_type).await? {
            debug!("Stripe event {} already processed", event.id);
            return Ok(());
        }

        if let Err(e) = self.apply(&event).await {
            // Let Stripe redeliver.
            self.events.forget(&event.id).await?;
            return Err(e);
        }
        Ok(())
    }

    async fn apply(&self, event: &StripeEvent) -> Result<(), AppError> {
        match event.event_type.as_str() {
            "invoice.paid" => {
                let stripe_invoice_id = event
                    .data
                    .object
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AppError::BadRequest("invoice.paid without invoice id".to_string()))?;

                match self
                    .invoices
                    .mark_paid_by_external(InvoiceProviderKind::Stripe.as_str(), stripe_invoice_id)
                    .await?
                {
                    Some(invoice) => info!("Invoice {} marked PAID from Stripe {}", invoice.id, stripe_invoice_id),
                    None => warn!("No issued invoice matches Stripe invoice {}", stripe_invoice_id),
                }
            }
            other => debug!("Ignoring Stripe event type {}", other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const PAYLOAD: &str = r#"{"id":"evt_1","type":"invoice.paid","data":{"object":{"id":"in_1"}}}"#;

    fn sign(payload: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_is_accepted() {
        let now = 1_700_000_000;
        assert!(verify_webhook_signature(SECRET, PAYLOAD, &sign(PAYLOAD, now), now + 10).is_ok());
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let now = 1_700_000_000;
        let header = format!("{},v1=deadbeef", sign(PAYLOAD, now));
        assert!(verify_webhook_signature(SECRET, PAYLOAD, &header, now).is_ok());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let now = 1_700_000_000;
        let tampered = PAYLOAD.replace("in_1", "in_2");
        assert!(matches!(
            verify_webhook_signature(SECRET, &tampered, &sign(PAYLOAD, now), now),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, now - SIGNATURE_TOLERANCE_SECS - 1);
        assert!(verify_webhook_signature(SECRET, PAYLOAD, &header, now).is_err());
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        let now = 1_700_000_000;
        for header in ["t=-9223372036854775808,v1=00", "t=9223372036854775807,v1=00"] {
            assert!(matches!(
                verify_webhook_signature(SECRET, PAYLOAD, header, now),
                Err(AppError::Auth(_))
            ));
        }
        assert!(verify_webhook_signature(SECRET, PAYLOAD, "t=0,v1=00", i64::MIN).is_err());
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        assert!(verify_webhook_signature(SECRET, PAYLOAD, "v1=abc", 0).is_err());
        assert!(verify_webhook_signature(SECRET, PAYLOAD, "t=notanumber,v1=abc", 0).is_err());
    }

    #[test]
    fn test_event_parses() {
        let event: StripeEvent = serde_json::from_str(PAYLOAD).unwrap();
        assert_eq!(event.event_type, "invoice.paid");
        assert_eq!(event.data.object["id"], "in_1");
    }
}
