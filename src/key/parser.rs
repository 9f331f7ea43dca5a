//! Activation text → validated [`ProductKey`].
//!
//! Single pass, cheapest check first, stop at the first failure:
//!
//! ```text
//! Received ─► Decoded ─► ChecksumOk ─► SignatureOk ─► Parsed
//!     │           │            │              │
//!     └───────────┴────────────┴──────────────┴──► Rejected(reason)
//! ```
//!
//! 1. Format: key text decodes (length, alphabet) → `InvalidFormat`
//! 2. Checksum: CRC-16 over payload bytes 0..10 → `InvalidChecksum`
//! 3. Signature: the block is present, matches the key's digest, and
//!    verifies against the vendor key → `InvalidSignature`
//!
//! RSA math never runs on text that fails steps 1 or 2.

use crate::crypto::signature::SignatureVerifier;
use crate::key::checksum;
use crate::key::codec::{self, decode_key, encode_parts, signature_digest, DecodedKey};
use crate::key::payload::{LicenseType, ProductKey};
use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;
use tracing::debug;

/// Rejection category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Text is not a well-formed key.
    InvalidFormat,
    /// CRC-16 mismatch.
    InvalidChecksum,
    /// Signature missing, malformed, or not authentic.
    InvalidSignature,
}

/// Why a key was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason:?}: {detail}")]
pub struct KeyRejection {
    /// Category.
    pub reason: RejectReason,
    /// Diagnostic detail, never shown verbatim to users.
    pub detail: String,
}

impl KeyRejection {
    /// Build a rejection.
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Turns raw activation text into a validated product key.
#[derive(Debug, Clone)]
pub struct KeyParser {
    verifier: SignatureVerifier,
}

impl KeyParser {
    /// Create a parser verifying against `verifier`'s key.
    pub fn new(verifier: SignatureVerifier) -> Self {
        Self { verifier }
    }

    /// Parse and validate activation text.
    pub fn parse(&self, raw: &str) -> Result<ProductKey, KeyRejection> {
        let (key_text, signature_block) = codec::split_activation_text(raw);

        // Received → Decoded
        let decoded = decode_key(key_text)
            .map_err(|e| KeyRejection::new(RejectReason::InvalidFormat, e.0))?;
        debug!("product key decoded");

        // Decoded → ChecksumOk
        let payload = decoded.payload;
        if !checksum::verify(payload.header(), payload.checksum()) {
            return Err(KeyRejection::new(
                RejectReason::InvalidChecksum,
                format!(
                    "stored {:#06x}, computed {:#06x}",
                    payload.checksum(),
                    checksum::crc16(payload.header())
                ),
            ));
        }
        debug!("product key checksum ok");

        // ChecksumOk → SignatureOk
        let signature = self.verify_signature(&decoded, signature_block.as_deref())?;
        debug!("product key signature ok");

        // SignatureOk → Parsed
        let license_type = LicenseType::from_byte(payload.license_type_byte()).ok_or_else(|| {
            KeyRejection::new(
                RejectReason::InvalidFormat,
                format!("unknown license type {:#04x}", payload.license_type_byte()),
            )
        })?;

        // Wide fields keep only their low-order bytes, so several spellings
        // decode alike. Identity comes from the re-encoded fields.
        Ok(ProductKey {
            original_key: raw.to_string(),
            key_text: encode_parts(&payload, &decoded.digest),
            license_type,
            expiration_date: payload.expiration(),
            customer_id: payload.customer_id(),
            feature_flags: payload.feature_flags(),
            payload,
            signature,
        })
    }

    fn verify_signature(
        &self,
        decoded: &DecodedKey,
        block: Option<&str>,
    ) -> Result<Vec<u8>, KeyRejection> {
        let block = block.ok_or_else(|| {
            KeyRejection::new(RejectReason::InvalidSignature, "signature block missing")
        })?;

        let signature = STANDARD.decode(block).map_err(|e| {
            KeyRejection::new(
                RejectReason::InvalidSignature,
                format!("signature block is not base-64: {}", e),
            )
        })?;

        if signature_digest(&signature) != decoded.digest {
            return Err(KeyRejection::new(
                RejectReason::InvalidSignature,
                "signature does not belong to this key",
            ));
        }

        if !self.verifier.verify(decoded.payload.as_bytes(), &signature) {
            return Err(KeyRejection::new(
                RejectReason::InvalidSignature,
                "signature verification failed",
            ));
        }

        Ok(signature)
    }
}
