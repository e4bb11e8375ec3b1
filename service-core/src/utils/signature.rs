use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded `HMAC-SHA256(payload, secret)`.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex HMAC-SHA256 signature using constant-time comparison.
pub fn verify_hmac_sha256(
    secret: &str,
    payload: &[u8],
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected_signature = hmac_sha256_hex(secret, payload)?;

    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = signature.trim().as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_generation_and_verification() {
        let secret = "my_secret_key";
        let payload = b"order_123|pay_456";

        let signature = hmac_sha256_hex(secret, payload).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_hmac_sha256(secret, payload, &signature).unwrap());
    }

    #[test]
    fn test_invalid_signature() {
        let secret = "my_secret_key";
        let payload = b"order_123|pay_456";

        let signature = hmac_sha256_hex(secret, payload).unwrap();
        let first = if signature.starts_with('a') { "b" } else { "a" };
        let invalid_signature = format!("{}{}", first, &signature[1..]);

        assert!(!verify_hmac_sha256(secret, payload, &invalid_signature).unwrap());
    }

    #[test]
    fn test_tampered_payload() {
        let secret = "my_secret_key";
        let signature = hmac_sha256_hex(secret, b"order_123|pay_456").unwrap();

        assert!(!verify_hmac_sha256(secret, b"order_123|pay_999", &signature).unwrap());
    }

    #[test]
    fn test_wrong_length_signature() {
        assert!(!verify_hmac_sha256("secret", b"payload", "deadbeef").unwrap());
    }
}
