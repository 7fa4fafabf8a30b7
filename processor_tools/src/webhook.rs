//! Webhook signature scheme.
//!
//! The processor signs every delivery with `X-Processor-Signature: t=<unix seconds>,v1=<hex hmac>`, where the HMAC is
//! SHA-256 over `"{t}.{raw body}"` keyed with the shared webhook secret. Verification fails closed: a payload that
//! does not verify is never parsed, let alone processed.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Processor-Signature";

/// Replay window. Signatures older than this are rejected even when the digest matches.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Error)]
pub enum WebhookSignatureError {
    #[error("Signature header is malformed: {0}")]
    MalformedHeader(String),
    #[error("Signature does not match payload")]
    DigestMismatch,
    #[error("Signature timestamp is outside the accepted tolerance")]
    TimestampOutOfTolerance,
}

/// Compute the signature header value for `payload` at time `timestamp`. Used by the processor (and our tests).
pub fn sign(secret: &str, timestamp: DateTime<Utc>, payload: &str) -> String {
    let ts = timestamp.timestamp();
    let digest = signed_digest(secret, ts, payload);
    format!("t={ts},v1={digest}")
}

/// Verify a signature header against the raw payload.
///
/// `now` is injected so the tolerance window is testable; production callers pass `Utc::now()`.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &str,
    now: DateTime<Utc>,
) -> Result<(), WebhookSignatureError> {
    let (ts, provided) = parse_header(header)?;
    let expected = signed_digest(secret, ts, payload);
    if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        return Err(WebhookSignatureError::DigestMismatch);
    }
    let signed_at =
        Utc.timestamp_opt(ts, 0).single().ok_or_else(|| WebhookSignatureError::MalformedHeader(header.to_string()))?;
    if (now - signed_at).num_seconds().abs() > DEFAULT_TOLERANCE_SECS {
        return Err(WebhookSignatureError::TimestampOutOfTolerance);
    }
    Ok(())
}

fn signed_digest(secret: &str, timestamp: i64, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn parse_header(header: &str) -> Result<(i64, String), WebhookSignatureError> {
    let mut timestamp = None;
    let mut digest = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => digest = Some(v.to_string()),
            _ => {},
        }
    }
    match (timestamp, digest) {
        (Some(t), Some(d)) => Ok((t, d)),
        _ => Err(WebhookSignatureError::MalformedHeader(header.to_string())),
    }
}

/// Compare digests without leaking the mismatch position through timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &str = r#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;

    #[test]
    fn round_trip_verifies() {
        let now = Utc::now();
        let header = sign(SECRET, now, PAYLOAD);
        assert!(verify_signature(SECRET, &header, PAYLOAD, now).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let now = Utc::now();
        let header = sign(SECRET, now, PAYLOAD);
        let tampered = PAYLOAD.replace("succeeded", "payment_failed");
        let err = verify_signature(SECRET, &header, &tampered, now).unwrap_err();
        assert!(matches!(err, WebhookSignatureError::DigestMismatch));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let header = sign("whsec_other", now, PAYLOAD);
        let err = verify_signature(SECRET, &header, PAYLOAD, now).unwrap_err();
        assert!(matches!(err, WebhookSignatureError::DigestMismatch));
    }

    #[test]
    fn stale_signature_is_rejected() {
        let signed_at = Utc::now();
        let header = sign(SECRET, signed_at, PAYLOAD);
        let later = signed_at + chrono::Duration::seconds(DEFAULT_TOLERANCE_SECS + 1);
        let err = verify_signature(SECRET, &header, PAYLOAD, later).unwrap_err();
        assert!(matches!(err, WebhookSignatureError::TimestampOutOfTolerance));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let err = verify_signature(SECRET, "v1=deadbeef", PAYLOAD, Utc::now()).unwrap_err();
        assert!(matches!(err, WebhookSignatureError::MalformedHeader(_)));
    }
}
