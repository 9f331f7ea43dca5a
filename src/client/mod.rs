//! Online re-validation.
//!
//! [`RevalidationService`] is the seam between the license manager and the
//! vendor's validation service. [`http::HttpRevalidationClient`] is the
//! bundled implementation.

pub mod http;

use crate::protocol::models::OnlineStatus;
use crate::KeywardenError;
use async_trait::async_trait;

/// Asks the vendor whether a key is still in good standing.
#[async_trait]
pub trait RevalidationService: Send + Sync {
    /// Check `key_hash` for `machine_id`.
    ///
    /// `Err` means the service could not give an answer (network failure,
    /// timeout, server error after retries). A definitive answer, including
    /// a rejection, is always `Ok`.
    async fn check(&self, key_hash: &str, machine_id: &str) -> Result<OnlineStatus, KeywardenError>;
}
