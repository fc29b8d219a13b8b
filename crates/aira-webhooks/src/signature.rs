//! HMAC-SHA256 payload signing.
//!
//! Receivers recompute the signature over the exact request body bytes and
//! compare it against the `X-Signature-SHA256` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs a payload with the endpoint secret.
///
/// Returns the lowercase hex encoding of the HMAC-SHA256 tag.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex signature against a payload in constant time.
///
/// Malformed hex, a tag of the wrong length or a mismatched tag all return
/// `false`; this function never errors.
pub fn verify_signature(payload: &[u8], signature_hex: &str, secret: &str) -> bool {
    let signature = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}
