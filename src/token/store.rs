//! Encrypted token persistence with atomic writes.
//!
//! Stores exactly one protected token under `dirs::data_dir()/<namespace>/`.
//! Writes go through a temp file + rename under a mutex, so concurrent saves
//! never interleave and a load never sees a partial file.

use crate::crypto::protect::SecretProtector;
use crate::token::model::ActivationToken;
use crate::KeywardenError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

/// Token file name.
const TOKEN_FILE: &str = "activation.dat";

/// Temp file used during atomic writes.
const TOKEN_TEMP_FILE: &str = "activation.dat.tmp";

/// Durable home of the activation token.
pub struct TokenStore {
    dir: PathBuf,
    protector: Arc<dyn SecretProtector>,
    write_lock: Mutex<()>,
}

impl TokenStore {
    /// Store under `dirs::data_dir()/<namespace>/`.
    pub fn new(namespace: &str, protector: Arc<dyn SecretProtector>) -> Result<Self, KeywardenError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| KeywardenError::TokenIO("Could not find data directory".to_string()))?;

        Ok(Self::with_path(base_dir.join(namespace), protector))
    }

    /// Store in an explicit directory.
    pub fn with_path(dir: PathBuf, protector: Arc<dyn SecretProtector>) -> Self {
        Self {
            dir,
            protector,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the token file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    /// Directory holding the token file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize, protect and atomically write `token`.
    pub async fn save(&self, token: &ActivationToken) -> Result<(), KeywardenError> {
        let json = serde_json::to_vec(token)
            .map_err(|e| KeywardenError::TokenFormat(format!("Failed to serialize: {}", e)))?;
        let blob = self.protector.protect(&json)?;

        let _guard = self.write_lock.lock().await;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| KeywardenError::TokenIO(format!("Failed to create token dir: {}", e)))?;

        let temp_path = self.dir.join(TOKEN_TEMP_FILE);
        fs::write(&temp_path, &blob)
            .await
            .map_err(|e| KeywardenError::TokenIO(format!("Failed to write temp file: {}", e)))?;

        fs::rename(&temp_path, self.path())
            .await
            .map_err(|e| KeywardenError::TokenIO(format!("Failed to rename token file: {}", e)))?;

        Ok(())
    }

    /// Read and unprotect the token.
    ///
    /// Absent, unreadable, foreign or corrupted files all yield `None`.
    pub async fn load(&self) -> Option<ActivationToken> {
        match self.try_load().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, path = %self.path().display(), "discarding unreadable activation token");
                None
            }
        }
    }

    async fn try_load(&self) -> Result<Option<ActivationToken>, KeywardenError> {
        let blob = match fs::read(self.path()).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(KeywardenError::TokenIO(format!(
                    "Failed to read token file: {}",
                    e
                )))
            }
        };

        let json = self.protector.unprotect(&blob)?;
        let token = serde_json::from_slice(&json)
            .map_err(|e| KeywardenError::TokenFormat(format!("Failed to parse token: {}", e)))?;

        Ok(Some(token))
    }

    /// Remove the persisted token, if any.
    pub async fn clear(&self) -> Result<(), KeywardenError> {
        let _guard = self.write_lock.lock().await;

        match fs::remove_file(self.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeywardenError::TokenIO(format!(
                "Failed to delete token file: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::protect::MachineScopedProtector;
    use crate::key::payload::LicenseType;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn make_token(customer_id: u32) -> ActivationToken {
        ActivationToken {
            product_key_hash: "cd".repeat(32),
            license_type: LicenseType::Admin,
            expiration_date: None,
            customer_id,
            enabled_features: ["view_guides".to_string(), "edit_guides".to_string()]
                .into_iter()
                .collect(),
            machine_id: "machine-a".to_string(),
            validated_date: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
            online_validation: true,
            signature: "ff".repeat(32),
        }
    }

    fn store_in(dir: &TempDir, principal: &str) -> TokenStore {
        TokenStore::with_path(
            dir.path().join("keywarden"),
            Arc::new(MachineScopedProtector::new("machine-a", principal)),
        )
    }

    #[tokio::test]
    async fn test_token_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "alice");
        let token = make_token(42);

        store.save(&token).await.unwrap();

        assert_eq!(store.load().await, Some(token));
        assert!(!store.dir().join(TOKEN_TEMP_FILE).exists());
    }

    #[tokio::test]
    async fn test_token_store_file_is_opaque() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "alice");
        store.save(&make_token(42)).await.unwrap();

        let raw = std::fs::read(store.path()).unwrap();
        let needle = b"machine-a";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));
    }

    #[tokio::test]
    async fn test_token_store_load_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(store_in(&temp_dir, "alice").load().await, None);
    }

    #[tokio::test]
    async fn test_token_store_foreign_principal_loads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        store_in(&temp_dir, "alice").save(&make_token(42)).await.unwrap();

        assert_eq!(store_in(&temp_dir, "mallory").load().await, None);
    }

    #[tokio::test]
    async fn test_token_store_corrupted_loads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "alice");
        store.save(&make_token(42)).await.unwrap();

        std::fs::write(store.path(), b"garbage").unwrap();
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn test_token_store_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "alice");

        store.save(&make_token(1)).await.unwrap();
        store.save(&make_token(2)).await.unwrap();

        assert_eq!(store.load().await.map(|t| t.customer_id), Some(2));
    }

    #[tokio::test]
    async fn test_token_store_concurrent_saves() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&temp_dir, "alice"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.save(&make_token(i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loaded = store.load().await.unwrap();
        assert!(loaded.customer_id < 8);
    }

    #[tokio::test]
    async fn test_token_store_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "alice");

        store.save(&make_token(42)).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await, None);

        // Clearing twice is fine.
        store.clear().await.unwrap();
    }
}
