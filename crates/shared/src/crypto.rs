//! Cryptographic utilities for webhook signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature of an outgoing webhook body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("HMAC signing error: {0}")]
    Signing(String),
}

/// Signs a payload with HMAC-SHA256, formatted as `sha256=<hex>`.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CryptoError::Signing(e.to_string()))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verifies a `sha256=<hex>` signature in constant time.
pub fn verify_signature(payload: &[u8], secret: &str, signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
