//! Activation token construction and verification.
//!
//! Pure: no I/O. Persistence belongs to [`crate::token::store::TokenStore`].

use crate::crypto::digest::hash_product_key;
use crate::crypto::seal::{seal, verify_seal};
use crate::key::payload::ProductKey;
use crate::policy::access::features_for;
use crate::token::model::ActivationToken;
use crate::KeywardenError;
use chrono::{DateTime, Utc};

/// Maximum tolerated skew between a token's `validated_date` and the clock.
pub const MAX_FUTURE_SKEW_SECONDS: i64 = 60;

/// Builds and checks sealed activation tokens.
pub struct TokenFactory {
    secret: String,
}

impl TokenFactory {
    /// Create a factory sealing with `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Build a sealed token for a parsed key on `machine_id`.
    pub fn create(
        &self,
        key: &ProductKey,
        machine_id: &str,
        now: DateTime<Utc>,
        online_validation: bool,
    ) -> Result<ActivationToken, KeywardenError> {
        let token = ActivationToken {
            product_key_hash: hash_product_key(&key.key_text),
            license_type: key.license_type,
            expiration_date: key.expiration_date,
            customer_id: key.customer_id,
            enabled_features: features_for(key.license_type, key.feature_flags),
            machine_id: machine_id.to_string(),
            validated_date: now,
            online_validation,
            signature: String::new(),
        };

        self.sealed(token)
    }

    /// Copy of `token` re-validated at `now`, resealed.
    pub fn revalidated(
        &self,
        token: &ActivationToken,
        now: DateTime<Utc>,
        online_validation: bool,
    ) -> Result<ActivationToken, KeywardenError> {
        let mut next = token.clone();
        next.validated_date = now;
        next.online_validation = online_validation;
        self.sealed(next)
    }

    /// Check that a loaded token belongs to this machine, is unmodified, and
    /// was not validated in the future.
    pub fn verify(
        &self,
        token: &ActivationToken,
        machine_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), KeywardenError> {
        if token.machine_id != machine_id {
            return Err(KeywardenError::MachineMismatch);
        }

        if !verify_seal(
            &self.secret,
            &token.machine_id,
            &token.signing_message(),
            &token.signature,
        ) {
            return Err(KeywardenError::TokenTampered);
        }

        let ahead_seconds = token.validated_date.signed_duration_since(now).num_seconds();
        if ahead_seconds > MAX_FUTURE_SKEW_SECONDS {
            return Err(KeywardenError::TokenFromFuture { ahead_seconds });
        }

        Ok(())
    }

    fn sealed(&self, mut token: ActivationToken) -> Result<ActivationToken, KeywardenError> {
        token.signature = seal(&self.secret, &token.machine_id, &token.signing_message())?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::codec::encode_key;
    use crate::key::payload::{LicenseType, Payload};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn product_key(license_type: LicenseType, flags: u8) -> ProductKey {
        let payload = Payload::new(license_type, None, 42, flags);
        let signature = vec![7u8; 256];
        let key_text = encode_key(&payload, &signature);
        ProductKey {
            original_key: key_text.clone(),
            key_text,
            license_type,
            expiration_date: None,
            customer_id: 42,
            feature_flags: flags,
            payload,
            signature,
        }
    }

    #[test]
    fn test_create_binds_key_and_machine() {
        let factory = TokenFactory::new("secret");
        let key = product_key(LicenseType::Admin, 0b01);
        let token = factory.create(&key, "machine-a", now(), false).unwrap();

        assert_eq!(token.product_key_hash, hash_product_key(&key.key_text));
        assert_ne!(token.product_key_hash, key.key_text);
        assert_eq!(token.machine_id, "machine-a");
        assert_eq!(token.customer_id, 42);
        assert!(token.has_feature("edit_guides"));
        assert!(token.has_feature("flag_0"));
        assert!(factory.verify(&token, "machine-a", now()).is_ok());
    }

    #[test]
    fn test_verify_detects_edits() {
        let factory = TokenFactory::new("secret");
        let mut token = factory
            .create(&product_key(LicenseType::Tech, 0), "machine-a", now(), false)
            .unwrap();
        token.license_type = LicenseType::Admin;

        assert!(matches!(
            factory.verify(&token, "machine-a", now()),
            Err(KeywardenError::TokenTampered)
        ));
    }

    #[test]
    fn test_verify_detects_foreign_machine() {
        let factory = TokenFactory::new("secret");
        let token = factory
            .create(&product_key(LicenseType::Tech, 0), "machine-a", now(), false)
            .unwrap();

        assert!(matches!(
            factory.verify(&token, "machine-b", now()),
            Err(KeywardenError::MachineMismatch)
        ));
    }

    #[test]
    fn test_verify_detects_other_secret() {
        let token = TokenFactory::new("secret")
            .create(&product_key(LicenseType::Tech, 0), "machine-a", now(), false)
            .unwrap();

        assert!(matches!(
            TokenFactory::new("other").verify(&token, "machine-a", now()),
            Err(KeywardenError::TokenTampered)
        ));
    }

    #[test]
    fn test_verify_rejects_future_validation() {
        let factory = TokenFactory::new("secret");
        let token = factory
            .create(&product_key(LicenseType::Tech, 0), "machine-a", now(), false)
            .unwrap();

        // Small skew is tolerated.
        assert!(factory
            .verify(&token, "machine-a", now() - Duration::seconds(30))
            .is_ok());

        assert!(matches!(
            factory.verify(&token, "machine-a", now() - Duration::hours(1)),
            Err(KeywardenError::TokenFromFuture { ahead_seconds: 3600 })
        ));
    }

    #[test]
    fn test_revalidated_reseals() {
        let factory = TokenFactory::new("secret");
        let token = factory
            .create(&product_key(LicenseType::Tech, 0), "machine-a", now(), false)
            .unwrap();
        let later = now() + Duration::days(7);

        let next = factory.revalidated(&token, later, true).unwrap();
        assert_eq!(next.validated_date, later);
        assert!(next.online_validation);
        assert_ne!(next.signature, token.signature);
        assert!(factory.verify(&next, "machine-a", later).is_ok());
    }
}
