// Inbound webhook signatures
//
// Header format: `X-Webhook-Signature: t=<unix seconds>,v1=<hex hmac>`
// Signed payload: `<t>.<raw body>`, HMAC-SHA256 keyed with the webhook secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::config::WebhookConfig;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,
    #[error("Malformed signature header")]
    MalformedSignature,
    #[error("Signature timestamp outside the allowed tolerance")]
    TimestampOutOfTolerance,
    #[error("Signature does not match payload")]
    SignatureMismatch,
    #[error("Webhook secret cannot be used as an HMAC key")]
    InvalidKey,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// `None` when no secret is configured; the webhook route then answers 503.
    pub fn from_config(config: &WebhookConfig) -> Option<Self> {
        config
            .secret
            .as_ref()
            .map(|secret| Self::new(secret.as_bytes(), config.tolerance_secs))
    }

    pub fn verify(&self, header: Option<&str>, body: &[u8], now: DateTime<Utc>) -> Result<(), WebhookError> {
        let header = header.ok_or(WebhookError::MissingSignature)?;
        let (timestamp, signatures) = parse_header(header)?;

        let within_tolerance = now
            .timestamp()
            .checked_sub(timestamp)
            .map_or(false, |skew| skew.unsigned_abs() <= self.tolerance_secs.unsigned_abs());
        if !within_tolerance {
            return Err(WebhookError::TimestampOutOfTolerance);
        }

        // Any listed v1 signature may match; senders list several while rotating secrets
        for signature in signatures {
            let Ok(expected) = hex::decode(signature) else {
                continue;
            };
            if self.mac(timestamp, body)?.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }
        Err(WebhookError::SignatureMismatch)
    }

    /// Header value for `body` signed at `timestamp`
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> Result<String, WebhookError> {
        let digest = self.mac(timestamp, body)?.finalize().into_bytes();
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }

    fn mac(&self, timestamp: i64, body: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| WebhookError::InvalidKey)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| WebhookError::MalformedSignature)?)
            }
            Some(("v1", value)) => signatures.push(value),
            Some(_) => {}
            None => return Err(WebhookError::MalformedSignature),
        }
    }

    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(WebhookError::MalformedSignature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BODY: &[u8] = br#"{"event":"payment.succeeded","amount":1200}"#;

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    #[test]
    fn signed_payload_verifies() {
        let verifier = WebhookVerifier::new("whsec_test", 300);
        let header = verifier.sign(1_700_000_000, BODY).unwrap();

        assert_eq!(verifier.verify(Some(&header), BODY, at(1_700_000_100)), Ok(()));
    }

    #[test]
    fn tampered_body_or_other_secret_fails() {
        let verifier = WebhookVerifier::new("whsec_test", 300);
        let header = WebhookVerifier::new("whsec_other", 300).sign(1_700_000_000, BODY).unwrap();
        assert_eq!(
            verifier.verify(Some(&header), BODY, at(1_700_000_000)),
            Err(WebhookError::SignatureMismatch)
        );

        let header = verifier.sign(1_700_000_000, BODY).unwrap();
        assert_eq!(
            verifier.verify(Some(&header), b"{}", at(1_700_000_000)),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn skew_beyond_tolerance_fails() {
        let verifier = WebhookVerifier::new("whsec_test", 300);
        let header = verifier.sign(1_700_000_000, BODY).unwrap();

        assert_eq!(verifier.verify(Some(&header), BODY, at(1_700_000_300)), Ok(()));
        assert_eq!(
            verifier.verify(Some(&header), BODY, at(1_700_000_301)),
            Err(WebhookError::TimestampOutOfTolerance)
        );
        assert_eq!(
            verifier.verify(Some(&header), BODY, at(1_699_999_699)),
            Err(WebhookError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn malformed_headers() {
        let verifier = WebhookVerifier::new("whsec_test", 300);
        let now = at(1_700_000_000);

        assert_eq!(verifier.verify(None, BODY, now), Err(WebhookError::MissingSignature));
        for header in ["", "t=abc,v1=00", "v1=00", "t=1700000000", "garbage"] {
            assert_eq!(
                verifier.verify(Some(header), BODY, now),
                Err(WebhookError::MalformedSignature),
                "header {:?}",
                header
            );
        }

        for header in ["t=-9223372036854775808,v1=00", "t=9223372036854775807,v1=00"] {
            assert_eq!(
                verifier.verify(Some(header), BODY, now),
                Err(WebhookError::TimestampOutOfTolerance),
                "header {:?}",
                header
            );
        }
    }
}
