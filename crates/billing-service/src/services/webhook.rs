//! Payment rail webhook signature verification.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`.
//! Signed message: `"{t}.{payload}"`, HMAC-SHA256 with the endpoint secret.
//! Several `v1` entries may be present during secret rotation; any match
//! is accepted.

use chrono::{DateTime, Utc};
use ring::hmac;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Malformed signature header")]
    MalformedHeader,

    #[error("No matching signature")]
    NoMatchingSignature,

    #[error("Timestamp outside tolerance")]
    TimestampOutOfTolerance,
}

/// Verify a webhook payload against its signature header.
///
/// # Errors
///
/// `MalformedHeader` if the header lacks a timestamp or any `v1` entry;
/// `TimestampOutOfTolerance` if `|now - t|` exceeds `tolerance`;
/// `NoMatchingSignature` if no `v1` entry matches.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse().map_err(|_| WebhookError::MalformedHeader)?);
            }
            Some(("v1", value)) => {
                // Undecodable entries are ignored; they can never match.
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }

    if now.timestamp().abs_diff(timestamp) > tolerance.as_secs() {
        return Err(WebhookError::TimestampOutOfTolerance);
    }

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let message = signed_message(timestamp, payload);

    if signatures
        .iter()
        .any(|signature| hmac::verify(&key, &message, signature).is_ok())
    {
        Ok(())
    } else {
        Err(WebhookError::NoMatchingSignature)
    }
}

/// Build a signature header for `payload`, as the payment rail would.
#[must_use]
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, &signed_message(timestamp, payload));
    format!("t={timestamp},v1={}", hex::encode(tag.as_ref()))
}

fn signed_message(timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let prefix = format!("{timestamp}.");
    let mut message = Vec::with_capacity(prefix.len() + payload.len());
    message.extend_from_slice(prefix.as_bytes());
    message.extend_from_slice(payload);
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &[u8] = br#"{"type":"payment_intent.succeeded"}"#;
    const TOLERANCE: Duration = Duration::from_secs(300);

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_valid_signature_accepted() {
        let header = sign_webhook_payload(PAYLOAD, SECRET, 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(PAYLOAD, &header, SECRET, TOLERANCE, now()),
            Ok(())
        );
    }

    #[test]
    fn test_rotated_secret_entries() {
        let good = sign_webhook_payload(PAYLOAD, SECRET, 1_700_000_000);
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t=1700000000,v1={},v1={v1}", "00".repeat(32));

        assert!(verify_webhook_signature(PAYLOAD, &header, SECRET, TOLERANCE, now()).is_ok());
    }

    #[test]
    fn test_wrong_secret_or_payload_rejected() {
        let header = sign_webhook_payload(PAYLOAD, "whsec_other", 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(PAYLOAD, &header, SECRET, TOLERANCE, now()),
            Err(WebhookError::NoMatchingSignature)
        );

        let header = sign_webhook_payload(PAYLOAD, SECRET, 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(b"{}", &header, SECRET, TOLERANCE, now()),
            Err(WebhookError::NoMatchingSignature)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let header = sign_webhook_payload(PAYLOAD, SECRET, 1_700_000_000 - 301);
        assert_eq!(
            verify_webhook_signature(PAYLOAD, &header, SECRET, TOLERANCE, now()),
            Err(WebhookError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn test_malformed_headers() {
        for header in ["", "v1=abcd", "t=1700000000", "t=soon,v1=abcd"] {
            assert_eq!(
                verify_webhook_signature(PAYLOAD, header, SECRET, TOLERANCE, now()),
                Err(WebhookError::MalformedHeader),
                "header {header:?}"
            );
        }
    }
}
