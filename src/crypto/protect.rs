//! At-rest protection for the persisted activation token.
//!
//! [`SecretProtector`] is the "protect / unprotect bytes for the current
//! principal" capability. Platform secret stores can implement it; the
//! bundled [`MachineScopedProtector`] uses AES-256-GCM with a key derived
//! from the machine fingerprint and the current principal, so a blob
//! written by one user or machine does not open on another.
//!
//! Blob format: `[nonce (12 bytes)] || [ciphertext + tag]`.

use crate::crypto::digest::sha256;
use crate::KeywardenError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

/// GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Key-derivation domain separator.
const KEY_CONTEXT: &str = "keywarden-token-v1";

/// Protect / unprotect bytes for the current principal.
pub trait SecretProtector: Send + Sync {
    /// Encrypt `plaintext` into an opaque blob.
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeywardenError>;

    /// Recover plaintext from a blob produced by [`SecretProtector::protect`].
    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, KeywardenError>;
}

/// AES-256-GCM protector scoped to one machine and principal.
pub struct MachineScopedProtector {
    key: [u8; 32],
}

impl MachineScopedProtector {
    /// Derive a protector for an explicit principal.
    pub fn new(machine_id: &str, principal: &str) -> Self {
        let material = format!("{}:{}:{}", KEY_CONTEXT, machine_id, principal);
        Self {
            key: sha256(material.as_bytes()),
        }
    }

    /// Derive a protector for the user running this process.
    pub fn for_current_user(machine_id: &str) -> Self {
        Self::new(machine_id, &current_principal())
    }
}

impl SecretProtector for MachineScopedProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeywardenError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let mut ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| KeywardenError::Protect(format!("encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.append(&mut ciphertext);
        Ok(blob)
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, KeywardenError> {
        if blob.len() <= NONCE_SIZE {
            return Err(KeywardenError::Unprotect("blob too short".to_string()));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| KeywardenError::Unprotect(format!("decryption failed: {}", e)))
    }
}

/// Identify the current principal (user account and home directory).
fn current_principal() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let home = dirs::home_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}@{}", user, home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let protector = MachineScopedProtector::new("machine-a", "alice");
        let blob = protector.protect(b"token bytes").unwrap();
        assert_ne!(&blob[NONCE_SIZE..], b"token bytes");
        assert_eq!(protector.unprotect(&blob).unwrap(), b"token bytes");
    }

    #[test]
    fn nonces_differ_between_calls() {
        let protector = MachineScopedProtector::new("machine-a", "alice");
        let a = protector.protect(b"same").unwrap();
        let b = protector.protect(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn foreign_principal_cannot_unprotect() {
        let alice = MachineScopedProtector::new("machine-a", "alice");
        let bob = MachineScopedProtector::new("machine-a", "bob");
        let blob = alice.protect(b"secret").unwrap();
        assert!(matches!(bob.unprotect(&blob), Err(KeywardenError::Unprotect(_))));
    }

    #[test]
    fn foreign_machine_cannot_unprotect() {
        let here = MachineScopedProtector::new("machine-a", "alice");
        let there = MachineScopedProtector::new("machine-b", "alice");
        let blob = here.protect(b"secret").unwrap();
        assert!(there.unprotect(&blob).is_err());
    }

    #[test]
    fn truncated_or_flipped_blob_is_rejected() {
        let protector = MachineScopedProtector::new("machine-a", "alice");
        assert!(protector.unprotect(&[0u8; NONCE_SIZE]).is_err());

        let mut blob = protector.protect(b"secret").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(protector.unprotect(&blob).is_err());
    }
}
