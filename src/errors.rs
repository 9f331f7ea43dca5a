//! Keywarden error types.
//!
//! Two families live here:
//! - [`KeywardenError`] covers infrastructure failures (configuration, key
//!   material, persistence, transport). Persistence failures on load never
//!   reach callers of the manager; they degrade to "not activated".
//! - [`ActivationError`] is the tagged outcome of a failed activation. Every
//!   variant renders one distinct, user-facing message.

use crate::key::parser::{KeyRejection, RejectReason};
use thiserror::Error;

/// Infrastructure errors.
#[derive(Debug, Error)]
pub enum KeywardenError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Public or private key material could not be loaded.
    #[error("Key material error: {0}")]
    KeyMaterial(String),

    /// The secret-protection capability failed to protect a blob.
    #[error("Failed to protect token: {0}")]
    Protect(String),

    /// The secret-protection capability could not unprotect a blob
    /// (foreign principal, other machine, or corrupted data).
    #[error("Failed to unprotect token: {0}")]
    Unprotect(String),

    /// Token file I/O error.
    #[error("Token I/O error: {0}")]
    TokenIO(String),

    /// Token contents could not be serialized or parsed.
    #[error("Token format error: {0}")]
    TokenFormat(String),

    /// Token seal does not match its contents.
    #[error("Token tampering detected")]
    TokenTampered,

    /// Token was activated on a different machine.
    #[error("Token is bound to a different machine")]
    MachineMismatch,

    /// Token claims a validation time ahead of the clock.
    #[error("Token validated in the future ({ahead_seconds}s ahead), possible clock tampering")]
    TokenFromFuture {
        /// How far ahead of the current clock the token is.
        ahead_seconds: i64,
    },

    /// The machine fingerprint could not be computed.
    #[error("Machine id unavailable: {0}")]
    MachineId(String),

    /// No valid, unexpired license is active.
    #[error("Not licensed")]
    NotLicensed,

    /// A required feature is not granted by the license.
    #[error("Required feature missing: {code}")]
    FeatureMissing {
        /// The feature that was required but missing.
        code: String,
    },

    /// HTTP transport error talking to the validation service.
    #[error("Validation service transport error: {0}")]
    Transport(String),
}

/// Why an activation attempt failed.
///
/// No variant is a catch-all for another: the UI maps each one to its own
/// message via `Display`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    /// Text is not a well-formed product key.
    #[error("The product key is not in the expected XXXXX-XXXXX-XXXXX-XXXXX-XXXXX format.")]
    InvalidFormat,

    /// Checksum mismatch, almost always a typo.
    #[error("The product key contains a typo. Please check each character and try again.")]
    InvalidChecksum,

    /// Signature missing, malformed, or not produced by the vendor key.
    #[error("The product key could not be verified as genuine.")]
    InvalidSignature,

    /// The key's expiration date has passed.
    #[error("This product key has expired.")]
    Expired,

    /// This exact key is already active on this machine, or the service
    /// reports it bound elsewhere.
    #[error("This product key is already activated.")]
    AlreadyActivated,

    /// The service refuses further machines for this key.
    #[error("This product key has reached its maximum number of activations.")]
    MaxActivationsReached,

    /// The validation service could not be reached.
    #[error("The activation server could not be reached. Check your connection and try again.")]
    NetworkError,

    /// The validation service does not know this key.
    #[error("This product key was not recognized by the activation server.")]
    NotFound,

    /// The key has been revoked by the vendor.
    #[error("This product key has been revoked.")]
    Revoked,

    /// Anything else (persistence failure, unexpected service answer).
    #[error("Activation failed unexpectedly: {0}")]
    Unknown(String),
}

impl From<KeyRejection> for ActivationError {
    fn from(rejection: KeyRejection) -> Self {
        match rejection.reason {
            RejectReason::InvalidFormat => ActivationError::InvalidFormat,
            RejectReason::InvalidChecksum => ActivationError::InvalidChecksum,
            RejectReason::InvalidSignature => ActivationError::InvalidSignature,
        }
    }
}
