//! HMAC signature verification for inbound webhook deliveries.
//!
//! The provider signs each delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>`, where the MAC is HMAC-SHA256 over
//! `"{timestamp}.{raw body}"`. Multiple `v1` entries may be present while
//! the provider rotates secrets; any one matching is enough.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("signature header has no timestamp")]
    MissingTimestamp,

    #[error("signature header timestamp is not a unix timestamp")]
    InvalidTimestamp,

    #[error("signature header has no v1 signature")]
    MissingSignature,

    #[error("signature timestamp is {age_secs}s old, outside the tolerance window")]
    TimestampOutOfTolerance { age_secs: i64 },

    #[error("no signature in the header matches the payload")]
    Mismatch,
}

/// Verifies webhook signature headers against a shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: Option<i64>,
}

impl SignatureVerifier {
    /// Creates a verifier with a replay tolerance window. A delivery whose
    /// timestamp is further than `tolerance_secs` from now (in either
    /// direction) is rejected before the MAC is checked.
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: Some(tolerance_secs),
        }
    }

    /// Creates a verifier that checks the MAC only, with no replay window.
    pub fn without_tolerance(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: None,
        }
    }

    /// Verifies `header` against `payload` at the current time.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, Utc::now())
    }

    /// Verifies `header` against `payload`, evaluating the replay window
    /// relative to `now`.
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let (timestamp, candidates) = parse_header(header)?;

        if let Some(tolerance) = self.tolerance_secs {
            let age_secs = (now.timestamp() - timestamp).abs();
            if age_secs > tolerance {
                return Err(SignatureError::TimestampOutOfTolerance { age_secs });
            }
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);

        // verify_slice compares in constant time.
        for candidate in candidates {
            let Ok(decoded) = hex::decode(candidate) else {
                continue;
            };
            if mac.clone().verify_slice(&decoded).is_ok() {
                return Ok(());
            }
        }
        Err(SignatureError::Mismatch)
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("t=") {
            timestamp = Some(
                value
                    .parse::<i64>()
                    .map_err(|_| SignatureError::InvalidTimestamp)?,
            );
        } else if let Some(value) = part.strip_prefix("v1=") {
            candidates.push(value);
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if candidates.is_empty() {
        return Err(SignatureError::MissingSignature);
    }
    Ok((timestamp, candidates))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn header_for(payload: &[u8], secret: &str, timestamp: i64) -> String {
        format!("t={},v1={}", timestamp, sign(payload, secret, timestamp))
    }

    #[test]
    fn valid_signature_is_accepted() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = Utc::now();
        let header = header_for(payload, SECRET, now.timestamp());

        assert!(verifier.verify_at(payload, &header, now).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = Utc::now();
        let header = header_for(payload, "wrong_secret", now.timestamp());

        assert_eq!(
            verifier.verify_at(payload, &header, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn modified_payload_is_rejected() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let payload = br#"{"amount":100}"#;
        let tampered = br#"{"amount":1000000}"#;
        let now = Utc::now();
        let header = header_for(payload, SECRET, now.timestamp());

        assert_eq!(
            verifier.verify_at(tampered, &header, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn old_timestamp_is_rejected_before_the_mac_check() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = Utc::now();
        let stale = now.timestamp() - 600;
        let header = header_for(payload, SECRET, stale);

        assert_eq!(
            verifier.verify_at(payload, &header, now),
            Err(SignatureError::TimestampOutOfTolerance { age_secs: 600 })
        );
    }

    #[test]
    fn without_tolerance_accepts_old_timestamps() {
        let verifier = SignatureVerifier::without_tolerance(SECRET);
        let payload = br#"{}"#;
        let now = Utc::now();
        let stale = now.timestamp() - 86_400;
        let header = header_for(payload, SECRET, stale);

        assert!(verifier.verify_at(payload, &header, now).is_ok());
    }

    #[test]
    fn any_matching_v1_entry_is_enough() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let payload = br#"{"id":"evt_1"}"#;
        let now = Utc::now();
        let good = sign(payload, SECRET, now.timestamp());
        let rotated_out = sign(payload, "previous_secret", now.timestamp());
        let header = format!("t={},v1={},v1={}", now.timestamp(), rotated_out, good);

        assert!(verifier.verify_at(payload, &header, now).is_ok());
    }

    #[test]
    fn header_without_timestamp_is_rejected() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let payload = br#"{}"#;
        let sig = sign(payload, SECRET, Utc::now().timestamp());

        assert_eq!(
            verifier.verify(payload, &format!("v1={sig}")),
            Err(SignatureError::MissingTimestamp)
        );
    }

    #[test]
    fn header_without_signature_is_rejected() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let now = Utc::now();

        assert_eq!(
            verifier.verify_at(b"{}", &format!("t={}", now.timestamp()), now),
            Err(SignatureError::MissingSignature)
        );
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        let verifier = SignatureVerifier::new(SECRET, 300);

        assert_eq!(
            verifier.verify(b"{}", "t=yesterday,v1=deadbeef"),
            Err(SignatureError::InvalidTimestamp)
        );
    }

    #[test]
    fn non_hex_signature_does_not_match() {
        let verifier = SignatureVerifier::new(SECRET, 300);
        let now = Utc::now();

        assert_eq!(
            verifier.verify_at(
                b"{}",
                &format!("t={},v1=not-hex-at-all", now.timestamp()),
                now
            ),
            Err(SignatureError::Mismatch)
        );
    }
}
