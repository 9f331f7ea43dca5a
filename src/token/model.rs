//! The durable activation token.

use crate::key::payload::LicenseType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Version tag mixed into the sealed message.
const SEAL_VERSION: &str = "kw-token-v1";

/// Machine-bound credential produced by a successful activation.
///
/// Never mutated in place: revalidation and re-activation build a new
/// token and replace the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationToken {
    /// SHA-256 of the canonical key text. The key itself is never stored.
    pub product_key_hash: String,

    /// License tier.
    pub license_type: LicenseType,

    /// Expiration, `None` for perpetual licenses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,

    /// Customer id from the payload.
    pub customer_id: u32,

    /// Features granted by the license type and flags.
    pub enabled_features: BTreeSet<String>,

    /// Fingerprint of the activating machine.
    pub machine_id: String,

    /// When the token was last validated (locally or online).
    pub validated_date: DateTime<Utc>,

    /// Whether the validation service corroborated this token.
    pub online_validation: bool,

    /// Hex HMAC seal over every other field.
    pub signature: String,
}

impl ActivationToken {
    /// `expiration_date` is present and earlier than `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp < now)
    }

    /// No expiration date.
    pub fn is_perpetual(&self) -> bool {
        self.expiration_date.is_none()
    }

    /// Whether the token grants `feature`.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.enabled_features.contains(feature)
    }

    /// Canonical byte rendering of every field except the seal.
    pub fn signing_message(&self) -> Vec<u8> {
        let expiration = self
            .expiration_date
            .map(|exp| exp.timestamp().to_string())
            .unwrap_or_else(|| "-".to_string());
        let features: Vec<&str> = self.enabled_features.iter().map(String::as_str).collect();

        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}.{:09}|{}",
            SEAL_VERSION,
            self.product_key_hash,
            self.license_type.as_byte(),
            expiration,
            self.customer_id,
            features.join(","),
            self.machine_id,
            self.validated_date.timestamp(),
            self.validated_date.timestamp_subsec_nanos(),
            self.online_validation,
        )
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn token(expiration: Option<DateTime<Utc>>) -> ActivationToken {
        ActivationToken {
            product_key_hash: "ab".repeat(32),
            license_type: LicenseType::Tech,
            expiration_date: expiration,
            customer_id: 7,
            enabled_features: ["view_guides".to_string()].into_iter().collect(),
            machine_id: "machine-a".to_string(),
            validated_date: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
            online_validation: false,
            signature: String::new(),
        }
    }

    #[test]
    fn expired_one_second_ago() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let token = token(Some(now - Duration::seconds(1)));
        assert!(token.is_expired_at(now));
        assert!(!token.is_perpetual());
    }

    #[test]
    fn not_expired_at_exact_instant() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert!(!token(Some(now)).is_expired_at(now));
    }

    #[test]
    fn perpetual_never_expires() {
        let token = token(None);
        assert!(token.is_perpetual());
        let far_future = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
        assert!(!token.is_expired_at(far_future));
    }

    #[test]
    fn signing_message_covers_fields() {
        let base = token(None);
        let mut other = base.clone();
        other.online_validation = true;
        assert_ne!(base.signing_message(), other.signing_message());

        let mut other = base.clone();
        other.enabled_features.insert("edit_guides".to_string());
        assert_ne!(base.signing_message(), other.signing_message());

        let mut other = base.clone();
        other.signature = "ignored".to_string();
        assert_eq!(base.signing_message(), other.signing_message());
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let mut original = token(Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
        original.validated_date = original.validated_date + Duration::nanoseconds(123_456_789);
        let json = serde_json::to_string(&original).unwrap();
        let restored: ActivationToken = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.signing_message(), original.signing_message());
    }
}
