//! SHA-256 helpers.

use sha2::{Digest, Sha256};

/// Raw SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// One-way hash of product key text.
///
/// Tokens and the validation service only ever see this hash, never the
/// key itself.
pub fn hash_product_key(key_text: &str) -> String {
    sha256_hex(key_text.as_bytes())
}

/// Leading characters of a key hash, safe to put in logs.
pub fn short_hash(key_hash: &str) -> &str {
    &key_hash[..12.min(key_hash.len())]
}
