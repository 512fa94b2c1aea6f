use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing signature header")]
    Missing,
    #[error("Malformed signature header")]
    Malformed,
    #[error("Signature mismatch")]
    Mismatch,
    #[error("Signature timestamp outside tolerance")]
    Expired,
}

/// Check a `t=<unix>,v1=<hex>` header against HMAC-SHA256 of `"{t}.{body}"`.
pub fn verify(
    secret: &str,
    header: Option<&str>,
    body: &[u8],
    now: i64,
    tolerance_seconds: i64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;

    let parts: HashMap<&str, &str> = header
        .split(',')
        .filter_map(|part| part.trim().split_once('='))
        .collect();

    let timestamp = parts.get("t").ok_or(SignatureError::Malformed)?;
    let received = parts.get("v1").ok_or(SignatureError::Malformed)?;
    let received = hex::decode(received).map_err(|_| SignatureError::Malformed)?;
    let issued_at: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&received).map_err(|_| SignatureError::Mismatch)?;

    if (now - issued_at).abs() > tolerance_seconds {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Build the header a gateway would send. Used by tests and tooling.
pub fn sign(secret: &str, body: &[u8], timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"type":"payment_intent.succeeded"}"#;

    #[test]
    fn test_valid_signature() {
        let header = sign(SECRET, BODY, 1_700_000_000);
        assert_eq!(verify(SECRET, Some(&header), BODY, 1_700_000_100, 300), Ok(()));
    }

    #[test]
    fn test_tampered_body() {
        let header = sign(SECRET, BODY, 1_700_000_000);
        let err = verify(SECRET, Some(&header), b"{}", 1_700_000_000, 300).unwrap_err();
        assert_eq!(err, SignatureError::Mismatch);
    }

    #[test]
    fn test_wrong_secret() {
        let header = sign("other", BODY, 1_700_000_000);
        let err = verify(SECRET, Some(&header), BODY, 1_700_000_000, 300).unwrap_err();
        assert_eq!(err, SignatureError::Mismatch);
    }

    #[test]
    fn test_stale_timestamp() {
        let header = sign(SECRET, BODY, 1_700_000_000);
        let err = verify(SECRET, Some(&header), BODY, 1_700_000_301, 300).unwrap_err();
        assert_eq!(err, SignatureError::Expired);
    }

    #[test]
    fn test_missing_and_malformed() {
        assert_eq!(verify(SECRET, None, BODY, 0, 300), Err(SignatureError::Missing));
        assert_eq!(
            verify(SECRET, Some("v1=abcd"), BODY, 0, 300),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify(SECRET, Some("t=1,v1=zz"), BODY, 0, 300),
            Err(SignatureError::Malformed)
        );
    }
}
