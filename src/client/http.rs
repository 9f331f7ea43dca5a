//! Reqwest-based HTTP client for the validation service.
//!
//! Transport errors, timeouts and 5xx responses are retried with exponential
//! backoff. Any other response is a definitive answer and returned as-is.

use crate::client::RevalidationService;
use crate::config::OnlineConfig;
use crate::protocol::models::{OnlineStatus, RevalidationRequest, RevalidationResponse};
use crate::KeywardenError;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// Why a single attempt produced no answer.
enum AttemptError {
    /// Worth retrying: transport failure, timeout, or 5xx.
    Transient(KeywardenError),
    /// Retrying cannot help.
    Fatal(KeywardenError),
}

impl AttemptError {
    fn transient(message: String) -> Self {
        AttemptError::Transient(KeywardenError::Transport(message))
    }

    fn into_inner(self) -> KeywardenError {
        match self {
            AttemptError::Transient(e) | AttemptError::Fatal(e) => e,
        }
    }
}

/// HTTP validation service client.
pub struct HttpRevalidationClient {
    client: OnceCell<Client>,
    endpoint: String,
    app_name: String,
    user_agent: String,
    request_timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpRevalidationClient {
    /// Create a client for `app_name` from online settings.
    ///
    /// The underlying reqwest client is built on first use.
    pub fn new(app_name: &str, online: &OnlineConfig) -> Self {
        Self {
            client: OnceCell::new(),
            endpoint: online.endpoint.to_string(),
            app_name: app_name.to_string(),
            user_agent: build_user_agent(app_name),
            request_timeout: online.request_timeout,
            max_retries: online.max_retries,
            backoff_base: online.backoff_base,
        }
    }

    /// Get the configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn client(&self) -> Result<&Client, AttemptError> {
        self.client.get_or_try_init(|| {
            Client::builder()
                .timeout(self.request_timeout)
                .build()
                .map_err(|e| {
                    AttemptError::Fatal(KeywardenError::ConfigError(format!(
                        "Failed to build HTTP client: {}",
                        e
                    )))
                })
        })
    }

    async fn attempt(&self, request: &RevalidationRequest<'_>) -> Result<OnlineStatus, AttemptError> {
        let response = self
            .client()?
            .post(&self.endpoint)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError::transient(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::transient(format!(
                "Server error: HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AttemptError::transient(format!("Failed to read body: {}", e)))?;

        Ok(match serde_json::from_slice::<RevalidationResponse>(&body) {
            Ok(parsed) => parsed.online_status(),
            Err(_) => OnlineStatus::Unknown(format!("HTTP {}", status.as_u16())),
        })
    }
}

#[async_trait]
impl RevalidationService for HttpRevalidationClient {
    async fn check(&self, key_hash: &str, machine_id: &str) -> Result<OnlineStatus, KeywardenError> {
        let request = RevalidationRequest {
            key_hash,
            machine_id,
            app: &self.app_name,
        };

        let retry_strategy = backoff_schedule(self.backoff_base, self.max_retries);

        let mut failures = 0u32;
        let status = RetryIf::spawn(
            retry_strategy,
            || self.attempt(&request),
            |e: &AttemptError| match e {
                AttemptError::Transient(error) => {
                    failures += 1;
                    if failures <= self.max_retries {
                        warn!(error = %error, attempt = failures, "retrying validation request");
                    }
                    true
                }
                AttemptError::Fatal(_) => false,
            },
        )
        .await
        .map_err(AttemptError::into_inner)?;

        debug!(status = %status, "validation service answered");
        Ok(status)
    }
}

/// Longest wait between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delays between attempts: retry `n` (counted from 1) waits `base * 2^n`,
/// capped at [`MAX_BACKOFF`].
pub fn backoff_schedule(base: Duration, max_retries: u32) -> impl Iterator<Item = Duration> {
    let base_millis = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    ExponentialBackoff::from_millis(2)
        .factor(base_millis)
        .max_delay(MAX_BACKOFF)
        .take(max_retries as usize)
}

/// Build a User-Agent string.
///
/// Format: `keywarden/<version> <app>`
/// Example: `keywarden/0.1.0 guidebook/2.1.0`
pub fn build_user_agent(app_name: &str) -> String {
    format!("keywarden/{} {}", env!("CARGO_PKG_VERSION"), app_name)
}
