// File: src/api/signature.rs
//
// Payment webhook signatures: `x-webhook-signature: t=<unix secs>,v1=<hex>`,
// HMAC-SHA256 over "<t>.<raw body>". Several `v1` entries may be present
// while the processor rotates secrets; any match is accepted.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("signature timestamp outside the tolerance window")]
    Expired,

    #[error("signature mismatch")]
    Mismatch,

    #[error("unusable webhook secret")]
    InvalidKey,
}

pub struct WebhookVerifier {
    keyed: HmacSha256,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: &[u8], tolerance_secs: i64) -> Result<Self, SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::InvalidKey);
        }
        let keyed = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self { keyed, tolerance_secs })
    }

    fn mac(&self, timestamp: i64, body: &[u8]) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac
    }

    /// Hex signature for `body` at `timestamp`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> String {
        hex::encode(self.mac(timestamp, body).finalize().into_bytes())
    }

    /// Full header value, as a payment processor would send it.
    pub fn header_value(&self, timestamp: i64, body: &[u8]) -> String {
        format!("t={},v1={}", timestamp, self.sign(timestamp, body))
    }

    pub fn verify(&self, header: Option<&str>, body: &[u8], now: i64) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;
        if header.trim().is_empty() {
            return Err(SignatureError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<Vec<u8>> = Vec::new();
        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| SignatureError::Malformed(format!("bad element '{}'", part)))?;
            match key {
                "t" => {
                    let t = value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::Malformed(format!("bad timestamp '{}'", value)))?;
                    timestamp = Some(t);
                }
                "v1" => {
                    // A non-hex entry can never match; skip it rather than fail.
                    if let Ok(bytes) = hex::decode(value) {
                        candidates.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| SignatureError::Malformed("no timestamp".into()))?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed("no v1 signature".into()));
        }
        let skew = now
            .checked_sub(timestamp)
            .map(i64::unsigned_abs)
            .ok_or(SignatureError::Expired)?;
        if skew > u64::try_from(self.tolerance_secs).unwrap_or(0) {
            return Err(SignatureError::Expired);
        }

        let expected = self.mac(timestamp, body);
        for candidate in &candidates {
            // verify_slice compares in constant time
            if expected.clone().verify_slice(candidate).is_ok() {
                return Ok(());
            }
        }
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"type":"payment.succeeded"}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(b"whsec_test123secret456", 300).expect("valid secret")
    }

    #[test]
    fn accepts_own_signature() {
        let v = verifier();
        let header = v.header_value(1_700_000_000, BODY);
        assert_eq!(v.verify(Some(&header), BODY, 1_700_000_010), Ok(()));
    }

    #[test]
    fn rejects_wrong_secret_and_modified_body() {
        let v = verifier();
        let other = WebhookVerifier::new(b"wrong_secret", 300).expect("valid secret");
        let header = other.header_value(1_700_000_000, BODY);
        assert_eq!(v.verify(Some(&header), BODY, 1_700_000_000), Err(SignatureError::Mismatch));

        let header = v.header_value(1_700_000_000, BODY);
        let tampered = br#"{"type":"payment.succeeded","hacked":true}"#;
        assert_eq!(v.verify(Some(&header), tampered, 1_700_000_000), Err(SignatureError::Mismatch));
    }

    #[test]
    fn rejects_old_timestamp() {
        let v = verifier();
        let header = v.header_value(1_700_000_000, BODY);
        assert_eq!(v.verify(Some(&header), BODY, 1_700_000_600), Err(SignatureError::Expired));
    }

    #[test]
    fn extreme_timestamps_are_expired() {
        let v = verifier();
        let zeros = "00".repeat(32);
        for t in [i64::MIN, i64::MAX, -1] {
            let header = format!("t={},v1={}", t, zeros);
            assert_eq!(v.verify(Some(&header), b"{}", 1_700_000_000), Err(SignatureError::Expired));
        }
        let header = format!("t=1700000000,v1={}", zeros);
        assert_eq!(v.verify(Some(&header), b"{}", i64::MIN), Err(SignatureError::Expired));
    }

    #[test]
    fn rotated_secret_still_matches() {
        let v = verifier();
        let sig = v.sign(1_700_000_000, BODY);
        let header = format!("t=1700000000,v1={},v1={}", "00".repeat(32), sig);
        assert_eq!(v.verify(Some(&header), BODY, 1_700_000_000), Ok(()));
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(WebhookVerifier::new(b"", 300), Err(SignatureError::InvalidKey)));
    }

    #[test]
    fn malformed_headers() {
        let v = verifier();
        assert_eq!(v.verify(None, BODY, 0), Err(SignatureError::MissingHeader));
        assert_eq!(v.verify(Some(""), BODY, 0), Err(SignatureError::MissingHeader));
        assert!(matches!(v.verify(Some("garbage"), BODY, 0), Err(SignatureError::Malformed(_))));
        assert!(matches!(v.verify(Some("v1=abcd"), BODY, 0), Err(SignatureError::Malformed(_))));
        assert!(matches!(v.verify(Some("t=1234567890"), BODY, 0), Err(SignatureError::Malformed(_))));
    }
}
