//! # Keywarden
//!
//! **Offline-first product-key activation and licensing for Rust.**
//!
//! Keywarden turns a printable, RSA-signed product key into a durable,
//! encrypted, machine-bound activation token, and answers "is this
//! installation licensed, with what rights, until when".
//!
//! ## Features
//!
//! - **Typo-proof keys**: 25-character base-58 keys with a CRC-16 guard, so
//!   transcription errors are caught before any signature math runs
//! - **RSA-2048 signatures**: PKCS#1 v1.5 / SHA-256 over the 12-byte payload
//! - **Sealed tokens**: HMAC-sealed, bound to the machine fingerprint, and
//!   encrypted at rest for the current user
//! - **Fail open on connectivity**: online re-validation adds corroboration
//!   or explicit revocation, never a downgrade on transient errors
//! - **Typed failures**: every rejection reason has its own message
//!
//! ## Quickstart
//!
//! ```no_run
//! use keywarden::{KeywardenConfig, LicenseManager};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KeywardenConfig::offline(
//!     "guidebook/2.1.0",
//!     "guidebook",
//!     "replace-with-a-long-app-secret",
//! );
//!
//! let manager = LicenseManager::new(config).await?;
//! match manager.activate("14HSo-5VeP1-t6Dag-pF111-11111\n<signature block>").await {
//!     Ok(info) => println!("Activated: {:?}", info.license_type),
//!     Err(reason) => println!("{}", reason),
//! }
//!
//! if manager.is_admin_license().await {
//!     println!("Guide editing enabled");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Threat Model
//!
//! Keywarden protects against:
//! - **Forged keys**: payloads not signed by the vendor key are rejected
//! - **Token editing**: decrypted tokens with a broken seal are discarded
//! - **Token copying**: tokens from another machine or user do not load
//! - **Clock rollback**: tokens validated in the future are discarded
//!
//! Keywarden does **not** prevent binary patching or code modification.
//! Client-side licensing can always be bypassed by a determined attacker
//! with access to the binary.
//!
//! See [`KeywardenConfig`] for configuration.

#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/keywarden/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;
pub mod machine;

// Crypto layer
pub mod crypto;

// Product keys
pub mod key;
pub mod issuer;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Token layer
pub mod token;

// Policy layer
pub mod policy;

// Manager (main public API)
pub mod manager;

// Re-exports for public API
pub use client::http::HttpRevalidationClient;
pub use client::RevalidationService;
pub use clock::{Clock, SystemClock};
pub use config::{KeywardenConfig, OnlineConfig};
pub use crypto::protect::{MachineScopedProtector, SecretProtector};
pub use errors::{ActivationError, KeywardenError};
pub use issuer::{IssuedKey, KeyIssuer};
pub use key::parser::{KeyParser, KeyRejection, RejectReason};
pub use key::payload::{LicenseType, ProductKey};
pub use machine::{HostMachineId, MachineIdProvider, StaticMachineId};
pub use manager::{LicenseManager, LicenseManagerBuilder};
pub use policy::access::LicenseInfo;
pub use protocol::models::OnlineStatus;
pub use token::model::ActivationToken;

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
