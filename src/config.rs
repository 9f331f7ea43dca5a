//! Keywarden configuration.

use crate::crypto::signature::{decode_public_key, EMBEDDED_PUBLIC_KEY_PEM};
use crate::KeywardenError;
use std::time::Duration;

/// Minimum length of the token sealing secret.
pub const MIN_SECRET_LEN: usize = 16;

/// Configuration for product-key activation.
///
/// Built by the embedding application; nothing here is read from the
/// environment.
#[derive(Debug, Clone)]
pub struct KeywardenConfig {
    /// Application name (e.g., "guidebook/2.1.0"). Sent to the validation
    /// service.
    pub app_name: &'static str,

    /// Vendor RSA public key (SPKI or PKCS#1 PEM, at least 2048 bits).
    /// SECURITY: This should be compiled into your application.
    pub public_key_pem: &'static str,

    /// Directory name under the platform data directory holding the token.
    pub token_namespace: &'static str,

    /// Secret mixed into the token seal.
    pub token_secret: &'static str,

    /// How long a validation stays fresh before online re-validation is due.
    pub revalidation_interval: Duration,

    /// Refuse to activate when the validation service is unreachable.
    /// When false, activation proceeds offline.
    pub require_online_activation: bool,

    /// Validation service settings. `None` disables online checks.
    pub online: Option<OnlineConfig>,
}

/// Validation service settings.
#[derive(Debug, Clone)]
pub struct OnlineConfig {
    /// Endpoint URL receiving revalidation requests.
    pub endpoint: &'static str,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Retries after the first attempt, for transient failures only.
    pub max_retries: u32,

    /// First retry delay; doubles on each further retry.
    pub backoff_base: Duration,
}

impl OnlineConfig {
    /// Settings for `endpoint` with a 10 s timeout and 3 retries from 500 ms.
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl KeywardenConfig {
    /// Offline-only configuration using the embedded public key and a
    /// 30-day revalidation interval.
    pub fn offline(
        app_name: &'static str,
        token_namespace: &'static str,
        token_secret: &'static str,
    ) -> Self {
        Self {
            app_name,
            public_key_pem: EMBEDDED_PUBLIC_KEY_PEM,
            token_namespace,
            token_secret,
            revalidation_interval: Duration::from_secs(30 * 24 * 60 * 60),
            require_online_activation: false,
            online: None,
        }
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), KeywardenError> {
        if self.app_name.is_empty() {
            return Err(KeywardenError::ConfigError(
                "app_name cannot be empty".to_string(),
            ));
        }
        if self.token_namespace.is_empty()
            || self.token_namespace.contains(['/', '\\'])
            || self.token_namespace.starts_with('.')
        {
            return Err(KeywardenError::ConfigError(format!(
                "token_namespace must be a plain directory name, got {:?}",
                self.token_namespace
            )));
        }
        if self.token_secret.len() < MIN_SECRET_LEN {
            return Err(KeywardenError::ConfigError(format!(
                "token_secret must be at least {} bytes, got {}",
                MIN_SECRET_LEN,
                self.token_secret.len()
            )));
        }
        if self.revalidation_interval.is_zero() {
            return Err(KeywardenError::ConfigError(
                "revalidation_interval must be positive".to_string(),
            ));
        }

        decode_public_key(self.public_key_pem)
            .map_err(|e| KeywardenError::ConfigError(format!("public_key_pem: {}", e)))?;

        if let Some(online) = &self.online {
            online.validate()?;
        }

        Ok(())
    }
}

impl OnlineConfig {
    fn validate(&self) -> Result<(), KeywardenError> {
        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(KeywardenError::ConfigError(format!(
                "online endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(KeywardenError::ConfigError(
                "request_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
