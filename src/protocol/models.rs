//! Validation service request/response structs and status extraction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Body POSTed to the validation service.
#[derive(Debug, Clone, Serialize)]
pub struct RevalidationRequest<'a> {
    /// SHA-256 of the canonical key text.
    pub key_hash: &'a str,
    /// Fingerprint of this machine.
    pub machine_id: &'a str,
    /// Application name from config.
    pub app: &'a str,
}

/// Raw validation service response.
#[derive(Debug, Clone, Deserialize)]
pub struct RevalidationResponse {
    /// Status code, e.g. `"valid"` or `"revoked"`.
    pub status: String,
    /// Optional human-readable detail.
    #[serde(default)]
    pub detail: Option<String>,
}

impl RevalidationResponse {
    /// Normalized status.
    pub fn online_status(&self) -> OnlineStatus {
        OnlineStatus::from_code(&self.status)
    }
}

/// Normalized answer from the validation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnlineStatus {
    /// The key is genuine and in good standing for this machine.
    Valid,
    /// The vendor revoked the key.
    Revoked,
    /// The service has no record of the key.
    NotFound,
    /// The key is bound to another machine.
    AlreadyActivated,
    /// The key has no activations left.
    MaxActivationsReached,
    /// Any status this client does not understand.
    Unknown(String),
}

impl OnlineStatus {
    /// Map a wire status code (case-insensitive).
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "valid" => OnlineStatus::Valid,
            "revoked" => OnlineStatus::Revoked,
            "not_found" => OnlineStatus::NotFound,
            "already_activated" => OnlineStatus::AlreadyActivated,
            "max_activations_reached" => OnlineStatus::MaxActivationsReached,
            _ => OnlineStatus::Unknown(code.to_string()),
        }
    }

    /// Wire status code.
    pub fn code(&self) -> &str {
        match self {
            OnlineStatus::Valid => "valid",
            OnlineStatus::Revoked => "revoked",
            OnlineStatus::NotFound => "not_found",
            OnlineStatus::AlreadyActivated => "already_activated",
            OnlineStatus::MaxActivationsReached => "max_activations_reached",
            OnlineStatus::Unknown(code) => code,
        }
    }
}

impl fmt::Display for OnlineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
