//! RSA signature verification for product key payloads.
//!
//! RSA-2048 (or larger), PKCS#1 v1.5 padding, SHA-256. Verification is
//! total: malformed signatures and internal failures report `false`.

use crate::KeywardenError;
use once_cell::sync::OnceCell;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::RwLock;

/// Vendor verification key compiled into the binary.
pub const EMBEDDED_PUBLIC_KEY_PEM: &str = include_str!("../../keys/dev_public.pem");

/// Minimum accepted modulus size.
pub const MIN_KEY_BITS: usize = 2048;

/// Cache of decoded public keys, keyed by PEM text.
static KEY_CACHE: OnceCell<RwLock<HashMap<String, VerifyingKey<Sha256>>>> = OnceCell::new();

/// Decode a PEM public key (SPKI or PKCS#1), with caching.
pub fn decode_public_key(pem: &str) -> Result<VerifyingKey<Sha256>, KeywardenError> {
    let cache = KEY_CACHE.get_or_init(|| RwLock::new(HashMap::new()));
    if let Ok(guard) = cache.read() {
        if let Some(key) = guard.get(pem) {
            return Ok(key.clone());
        }
    }

    let public_key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| KeywardenError::KeyMaterial(format!("Invalid RSA public key: {}", e)))?;

    let bits = public_key.size() * 8;
    if bits < MIN_KEY_BITS {
        return Err(KeywardenError::KeyMaterial(format!(
            "RSA key must be at least {} bits, got {}",
            MIN_KEY_BITS, bits
        )));
    }

    let verifying_key = VerifyingKey::<Sha256>::new(public_key);

    // Best-effort insert. If locking fails, still return the decoded key.
    if let Ok(mut guard) = cache.write() {
        guard.insert(pem.to_string(), verifying_key.clone());
    }

    Ok(verifying_key)
}

/// Stateless verifier holding one immutable public key.
#[derive(Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey<Sha256>,
}

impl SignatureVerifier {
    /// Build a verifier from PEM text.
    pub fn from_pem(pem: &str) -> Result<Self, KeywardenError> {
        Ok(Self {
            key: decode_public_key(pem)?,
        })
    }

    /// Build a verifier from the embedded vendor key.
    pub fn embedded() -> Result<Self, KeywardenError> {
        Self::from_pem(EMBEDDED_PUBLIC_KEY_PEM)
    }

    /// Check `signature` over `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::try_from(signature) else {
            return false;
        };
        self.key.verify(data, &signature).is_ok()
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}
