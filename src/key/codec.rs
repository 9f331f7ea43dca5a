//! Printable product key codec.
//!
//! A key is 25 base-58 characters shown as five dash-separated groups:
//!
//! ```text
//! PPPPP-PPPPP-PPPPP-PPDDD-DDDDD
//! ```
//!
//! - `P` (17 chars): the 12-byte payload, the narrowest lossless width.
//! - `D` (8 chars): the first 5 bytes of SHA-256 over the full signature.
//!
//! The digest binds the key to its signature but cannot reproduce it. The
//! full signature travels as a base-64 block after the key, separated by
//! whitespace; together they form the activation text.

use crate::crypto::digest::sha256;
use crate::key::base58::{decode_fixed, digit_of, encode_fixed};
use crate::key::payload::{Payload, PAYLOAD_LEN};
use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

/// Characters in a key, dashes excluded.
pub const KEY_CHARS: usize = 25;

/// Characters per display group.
pub const GROUP_LEN: usize = 5;

/// Characters carrying the payload.
pub const PAYLOAD_CHARS: usize = 17;

/// Characters carrying the signature digest.
pub const DIGEST_CHARS: usize = KEY_CHARS - PAYLOAD_CHARS;

/// Signature digest bytes embedded in the key.
pub const DIGEST_LEN: usize = 5;

/// Line width of the base-64 signature block.
const SIGNATURE_LINE_WIDTH: usize = 64;

/// Malformed key text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed product key: {0}")]
pub struct FormatError(pub String);

/// Payload and digest recovered from key text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    /// The 12-byte payload.
    pub payload: Payload,
    /// Truncated signature digest.
    pub digest: [u8; DIGEST_LEN],
}

/// First `DIGEST_LEN` bytes of SHA-256 over a signature.
pub fn signature_digest(signature: &[u8]) -> [u8; DIGEST_LEN] {
    let hash = sha256(signature);
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&hash[..DIGEST_LEN]);
    digest
}

/// Encode a payload and the digest of its signature as key text.
pub fn encode_key(payload: &Payload, signature: &[u8]) -> String {
    encode_parts(payload, &signature_digest(signature))
}

/// Encode a payload and an already computed digest as key text.
pub fn encode_parts(payload: &Payload, digest: &[u8; DIGEST_LEN]) -> String {
    let mut compact = encode_fixed(payload.as_bytes(), PAYLOAD_CHARS);
    compact.push_str(&encode_fixed(digest, DIGEST_CHARS));
    group(&compact)
}

/// Decode key text into payload and digest.
///
/// Dashes and surrounding whitespace are ignored.
pub fn decode_key(text: &str) -> Result<DecodedKey, FormatError> {
    let compact: String = text.trim().chars().filter(|c| *c != '-').collect();

    let char_count = compact.chars().count();
    if char_count != KEY_CHARS {
        return Err(FormatError(format!(
            "expected {} characters, got {}",
            KEY_CHARS, char_count
        )));
    }

    if let Some(bad) = compact.chars().find(|c| digit_of(*c).is_none()) {
        return Err(FormatError(format!("invalid character {:?}", bad)));
    }

    let (payload_text, digest_text) = compact.split_at(PAYLOAD_CHARS);

    let payload = decode_fixed::<PAYLOAD_LEN>(payload_text)
        .ok_or_else(|| FormatError("payload is not base-58".to_string()))?;
    let digest = decode_fixed::<DIGEST_LEN>(digest_text)
        .ok_or_else(|| FormatError("digest is not base-58".to_string()))?;

    Ok(DecodedKey {
        payload: Payload::from_bytes(payload),
        digest,
    })
}

/// Re-group compact key characters into dash-separated groups.
pub fn group(compact: &str) -> String {
    compact
        .as_bytes()
        .chunks(GROUP_LEN)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// Split activation text into the key and its optional signature block.
///
/// Whitespace inside the block (line wrapping) is removed.
pub fn split_activation_text(raw: &str) -> (&str, Option<String>) {
    let trimmed = raw.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((key, rest)) => {
            let block: String = rest.chars().filter(|c| !c.is_whitespace()).collect();
            (key, (!block.is_empty()).then_some(block))
        }
        None => (trimmed, None),
    }
}

/// Render key text followed by its wrapped base-64 signature block.
pub fn format_activation_text(key_text: &str, signature: &[u8]) -> String {
    let encoded = STANDARD.encode(signature);
    let lines: Vec<&str> = encoded
        .as_bytes()
        .chunks(SIGNATURE_LINE_WIDTH)
        .filter_map(|line| std::str::from_utf8(line).ok())
        .collect();
    format!("{}\n{}", key_text, lines.join("\n"))
}
