//! Binary license payload and the structured product key.
//!
//! Layout (12 bytes, little-endian multi-byte fields):
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 1    | license type (`0x01` Tech, `0x02` Admin) |
//! | 1      | 4    | expiration, Unix seconds (`0xFFFFFFFF` = perpetual) |
//! | 5      | 4    | customer id                             |
//! | 9      | 1    | feature flags                           |
//! | 10     | 2    | CRC-16 of bytes 0..10                   |

use crate::key::checksum::crc16;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Total payload size.
pub const PAYLOAD_LEN: usize = 12;

/// Bytes covered by the checksum.
pub const HEADER_LEN: usize = 10;

/// Expiration sentinel meaning "never expires".
pub const PERPETUAL: u32 = 0xFFFF_FFFF;

/// License tier carried in byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseType {
    /// Field technician: read-only access to guides.
    Tech,
    /// Administrator: may edit guides.
    Admin,
}

impl LicenseType {
    /// Decode the wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(LicenseType::Tech),
            0x02 => Some(LicenseType::Admin),
            _ => None,
        }
    }

    /// Encode to the wire byte.
    pub fn as_byte(self) -> u8 {
        match self {
            LicenseType::Tech => 0x01,
            LicenseType::Admin => 0x02,
        }
    }
}

impl std::fmt::Display for LicenseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LicenseType::Tech => write!(f, "Tech"),
            LicenseType::Admin => write!(f, "Admin"),
        }
    }
}

/// The fixed 12-byte payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload([u8; PAYLOAD_LEN]);

impl Payload {
    /// Build a payload and fill in its checksum.
    ///
    /// `expires_at` is Unix seconds; `None` writes the perpetual sentinel.
    pub fn new(
        license_type: LicenseType,
        expires_at: Option<u32>,
        customer_id: u32,
        feature_flags: u8,
    ) -> Self {
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[0] = license_type.as_byte();
        bytes[1..5].copy_from_slice(&expires_at.unwrap_or(PERPETUAL).to_le_bytes());
        bytes[5..9].copy_from_slice(&customer_id.to_le_bytes());
        bytes[9] = feature_flags;
        let checksum = crc16(&bytes[..HEADER_LEN]);
        bytes[HEADER_LEN..].copy_from_slice(&checksum.to_le_bytes());
        Self(bytes)
    }

    /// Wrap raw bytes as-is (the checksum is not recomputed).
    pub fn from_bytes(bytes: [u8; PAYLOAD_LEN]) -> Self {
        Self(bytes)
    }

    /// All 12 bytes.
    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    /// Bytes 0..10, the checksummed header.
    pub fn header(&self) -> &[u8] {
        &self.0[..HEADER_LEN]
    }

    /// Stored checksum (bytes 10..12).
    pub fn checksum(&self) -> u16 {
        u16::from_le_bytes([self.0[10], self.0[11]])
    }

    /// Raw license type byte.
    pub fn license_type_byte(&self) -> u8 {
        self.0[0]
    }

    /// Raw expiration seconds, including the perpetual sentinel.
    pub fn expiration_secs(&self) -> u32 {
        u32::from_le_bytes([self.0[1], self.0[2], self.0[3], self.0[4]])
    }

    /// Expiration as a timestamp, `None` when perpetual.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        match self.expiration_secs() {
            PERPETUAL => None,
            secs => DateTime::from_timestamp(i64::from(secs), 0),
        }
    }

    /// Customer id.
    pub fn customer_id(&self) -> u32 {
        u32::from_le_bytes([self.0[5], self.0[6], self.0[7], self.0[8]])
    }

    /// Feature flag bitfield.
    pub fn feature_flags(&self) -> u8 {
        self.0[9]
    }
}

/// A product key that passed format, checksum and signature checks.
///
/// Lives only for the duration of one activation attempt.
#[derive(Debug, Clone)]
pub struct ProductKey {
    /// Input exactly as received.
    pub original_key: String,
    /// Canonical dash-grouped key text (no signature block).
    pub key_text: String,
    /// License tier.
    pub license_type: LicenseType,
    /// Expiration, `None` for perpetual keys.
    pub expiration_date: Option<DateTime<Utc>>,
    /// Customer id.
    pub customer_id: u32,
    /// Opaque feature bitfield.
    pub feature_flags: u8,
    /// Raw payload.
    pub payload: Payload,
    /// Full RSA signature over the payload.
    pub signature: Vec<u8>,
}

impl ProductKey {
    /// Whether the key has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp < now)
    }

    /// Whether the key never expires.
    pub fn is_perpetual(&self) -> bool {
        self.expiration_date.is_none()
    }
}
