//! Product key issuing (vendor side).
//!
//! Signs payloads with the vendor's RSA private key and renders the
//! printable key plus its activation text. The private key must never ship
//! inside the client application.

use crate::key::codec::{encode_key, format_activation_text};
use crate::key::payload::{LicenseType, Payload, PERPETUAL};
use crate::KeywardenError;
use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;

/// A freshly issued key.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    /// The signed payload.
    pub payload: Payload,
    /// Printable `XXXXX-XXXXX-XXXXX-XXXXX-XXXXX` key.
    pub key_text: String,
    /// Full RSA signature over the payload.
    pub signature: Vec<u8>,
}

impl IssuedKey {
    /// Key text followed by the base-64 signature block, as delivered to
    /// customers.
    pub fn activation_text(&self) -> String {
        format_activation_text(&self.key_text, &self.signature)
    }
}

/// Signs product key payloads.
pub struct KeyIssuer {
    signing_key: SigningKey<Sha256>,
}

impl KeyIssuer {
    /// Load a PKCS#8 or PKCS#1 PEM private key.
    pub fn from_pem(pem: &str) -> Result<Self, KeywardenError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| KeywardenError::KeyMaterial(format!("Invalid RSA private key: {}", e)))?;

        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
        })
    }

    /// Sign a payload as-is.
    pub fn issue(&self, payload: Payload) -> Result<IssuedKey, KeywardenError> {
        let signature = self
            .signing_key
            .try_sign(payload.as_bytes())
            .map_err(|e| KeywardenError::KeyMaterial(format!("Signing failed: {}", e)))?
            .to_vec();

        Ok(IssuedKey {
            payload,
            key_text: encode_key(&payload, &signature),
            signature,
        })
    }

    /// Build, checksum and sign a payload from its fields.
    ///
    /// Expirations must fall within the 32-bit Unix range and may not equal
    /// the perpetual sentinel.
    pub fn issue_license(
        &self,
        license_type: LicenseType,
        expires_at: Option<DateTime<Utc>>,
        customer_id: u32,
        feature_flags: u8,
    ) -> Result<IssuedKey, KeywardenError> {
        let expires_secs = expires_at
            .map(|at| {
                u32::try_from(at.timestamp())
                    .ok()
                    .filter(|secs| *secs != PERPETUAL)
                    .ok_or_else(|| {
                        KeywardenError::ConfigError(format!(
                            "Expiration {} is outside the key's date range",
                            at
                        ))
                    })
            })
            .transpose()?;

        self.issue(Payload::new(
            license_type,
            expires_secs,
            customer_id,
            feature_flags,
        ))
    }
}
