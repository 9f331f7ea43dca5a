//! Keyed seal over activation token contents.
//!
//! HMAC-SHA256 keyed by SHA-256(`secret` ‖ 0x00 ‖ `machine_id`). Detects
//! edits to a decrypted token independently of the encryption layer, and
//! ties the seal to the machine that produced it.

use crate::crypto::digest::sha256;
use crate::KeywardenError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn seal_key(secret: &str, machine_id: &str) -> [u8; 32] {
    let mut material = Vec::with_capacity(secret.len() + machine_id.len() + 1);
    material.extend_from_slice(secret.as_bytes());
    material.push(0);
    material.extend_from_slice(machine_id.as_bytes());
    sha256(&material)
}

fn mac(secret: &str, machine_id: &str, message: &[u8]) -> Result<HmacSha256, KeywardenError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(&seal_key(secret, machine_id))
        .map_err(|e| KeywardenError::KeyMaterial(format!("Invalid seal key: {}", e)))?;
    mac.update(message);
    Ok(mac)
}

/// Compute the hex-encoded seal of `message`.
pub fn seal(secret: &str, machine_id: &str, message: &[u8]) -> Result<String, KeywardenError> {
    let mac = mac(secret, machine_id, message)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a hex-encoded seal in constant time.
pub fn verify_seal(secret: &str, machine_id: &str, message: &[u8], seal_hex: &str) -> bool {
    let Ok(expected) = hex::decode(seal_hex) else {
        return false;
    };
    let Ok(mac) = mac(secret, machine_id, message) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}
