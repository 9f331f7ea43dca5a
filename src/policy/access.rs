//! Feature grants and access checks.
//!
//! A license grants features from two sources:
//! - its type (Tech or Admin)
//! - each set bit `n` of the payload's flag byte, as the opaque feature
//!   `flag_<n>`

use crate::key::payload::LicenseType;
use crate::token::model::ActivationToken;
use crate::KeywardenError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Browse installation guides.
pub const FEATURE_VIEW_GUIDES: &str = "view_guides";

/// Keep guides available offline.
pub const FEATURE_OFFLINE_GUIDES: &str = "offline_guides";

/// Edit guides (Admin only).
pub const FEATURE_EDIT_GUIDES: &str = "edit_guides";

/// Publish guide changes (Admin only).
pub const FEATURE_PUBLISH_GUIDES: &str = "publish_guides";

/// Features granted by a license type and flag byte.
pub fn features_for(license_type: LicenseType, feature_flags: u8) -> BTreeSet<String> {
    let mut features: BTreeSet<String> = [FEATURE_VIEW_GUIDES, FEATURE_OFFLINE_GUIDES]
        .iter()
        .map(|f| f.to_string())
        .collect();

    if license_type == LicenseType::Admin {
        features.insert(FEATURE_EDIT_GUIDES.to_string());
        features.insert(FEATURE_PUBLISH_GUIDES.to_string());
    }

    for bit in 0..8 {
        if feature_flags & (1 << bit) != 0 {
            features.insert(format!("flag_{}", bit));
        }
    }

    features
}

/// Read-only view of the current license, computed against a clock
/// reading. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseInfo {
    /// A token is present and bound to this machine.
    pub is_activated: bool,

    /// License tier, when activated.
    pub license_type: Option<LicenseType>,

    /// Expiration, `None` when perpetual or not activated.
    pub expiration_date: Option<DateTime<Utc>>,

    /// Whole days until expiration (0 once expired), `None` when perpetual
    /// or not activated.
    pub days_remaining: Option<i64>,

    /// Customer id, when activated.
    pub customer_id: Option<u32>,

    /// Granted features.
    pub enabled_features: BTreeSet<String>,

    /// The license has an expiration in the past.
    pub is_expired: bool,

    /// The validation service corroborated the token.
    pub online_validation: bool,
}

impl LicenseInfo {
    /// Projection for an installation without a token.
    pub fn not_activated() -> Self {
        Self {
            is_activated: false,
            license_type: None,
            expiration_date: None,
            days_remaining: None,
            customer_id: None,
            enabled_features: BTreeSet::new(),
            is_expired: false,
            online_validation: false,
        }
    }

    /// Project a token at `now`.
    pub fn from_token(token: &ActivationToken, now: DateTime<Utc>) -> Self {
        let days_remaining = token
            .expiration_date
            .map(|exp| exp.signed_duration_since(now).num_days().max(0));

        Self {
            is_activated: true,
            license_type: Some(token.license_type),
            expiration_date: token.expiration_date,
            days_remaining,
            customer_id: Some(token.customer_id),
            enabled_features: token.enabled_features.clone(),
            is_expired: token.is_expired_at(now),
            online_validation: token.online_validation,
        }
    }

    /// Activated with no expiration.
    pub fn is_perpetual(&self) -> bool {
        self.is_activated && self.expiration_date.is_none()
    }

    /// Activated and not expired.
    pub fn is_licensed(&self) -> bool {
        self.is_activated && !self.is_expired
    }

    /// Whether `feature` is granted.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.enabled_features.contains(feature)
    }
}

/// Check that the license is usable and grants every required feature.
///
/// # Returns
/// * `Ok(())` - Access granted
/// * `Err(NotLicensed)` - Not activated, or expired
/// * `Err(FeatureMissing)` - First required feature not granted
pub fn check_access(info: &LicenseInfo, required_features: &[&str]) -> Result<(), KeywardenError> {
    if !info.is_licensed() {
        return Err(KeywardenError::NotLicensed);
    }

    for required in required_features {
        if !info.has_feature(required) {
            return Err(KeywardenError::FeatureMissing {
                code: (*required).to_string(),
            });
        }
    }

    Ok(())
}
