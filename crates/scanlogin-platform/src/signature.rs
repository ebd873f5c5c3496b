//! Webhook signatures.
//!
//! The platform signs every webhook request by sorting the shared token, the
//! request timestamp and a nonce lexicographically, concatenating them and
//! taking the lowercase hex SHA-1 of the result.

use sha1::{Digest, Sha1};

/// Compute the signature for `(token, timestamp, nonce)`.
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Check a received signature. Missing components never verify.
pub fn verify_signature(token: &str, signature: &str, timestamp: &str, nonce: &str) -> bool {
    if token.is_empty() || signature.is_empty() || timestamp.is_empty() || nonce.is_empty() {
        return false;
    }
    compute_signature(token, timestamp, nonce) == signature
}
