//! License Manager - the main public API for Keywarden.
//!
//! The `LicenseManager` is the single source of truth for "is this
//! installation licensed, with what rights, until when":
//! - Activation: parse, verify, optionally confirm online, seal, persist
//! - Projection: license info recomputed against the clock on every call
//! - Online re-validation: corroborates or revokes, never downgrades on
//!   network failure
//!
//! One in-memory token slot is loaded at startup and replaced wholesale on
//! every write.

use crate::client::http::HttpRevalidationClient;
use crate::client::RevalidationService;
use crate::clock::{Clock, SystemClock};
use crate::config::KeywardenConfig;
use crate::crypto::digest::{hash_product_key, short_hash};
use crate::crypto::protect::{MachineScopedProtector, SecretProtector};
use crate::crypto::signature::SignatureVerifier;
use crate::errors::ActivationError;
use crate::key::parser::KeyParser;
use crate::key::payload::LicenseType;
use crate::machine::{HostMachineId, MachineIdProvider};
use crate::policy::access::{check_access, LicenseInfo};
use crate::protocol::models::OnlineStatus;
use crate::token::factory::TokenFactory;
use crate::token::model::ActivationToken;
use crate::token::store::TokenStore;
use crate::KeywardenError;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Builder for [`LicenseManager`].
///
/// Every collaborator has a production default; tests swap in their own.
pub struct LicenseManagerBuilder {
    config: KeywardenConfig,
    clock: Option<Arc<dyn Clock>>,
    machine_id: Option<Arc<dyn MachineIdProvider>>,
    protector: Option<Arc<dyn SecretProtector>>,
    revalidation: Option<Arc<dyn RevalidationService>>,
    token_dir: Option<PathBuf>,
}

impl LicenseManagerBuilder {
    /// Start from a configuration.
    pub fn new(config: KeywardenConfig) -> Self {
        Self {
            config,
            clock: None,
            machine_id: None,
            protector: None,
            revalidation: None,
            token_dir: None,
        }
    }

    /// Use a custom clock. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a custom machine id source. Defaults to [`HostMachineId`].
    pub fn machine_id(mut self, provider: Arc<dyn MachineIdProvider>) -> Self {
        self.machine_id = Some(provider);
        self
    }

    /// Use a custom secret protector. Defaults to
    /// [`MachineScopedProtector::for_current_user`].
    pub fn protector(mut self, protector: Arc<dyn SecretProtector>) -> Self {
        self.protector = Some(protector);
        self
    }

    /// Use a custom validation service. Defaults to an
    /// [`HttpRevalidationClient`] when `config.online` is set.
    pub fn revalidation_service(mut self, service: Arc<dyn RevalidationService>) -> Self {
        self.revalidation = Some(service);
        self
    }

    /// Store the token in `dir` instead of the platform data directory.
    pub fn token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_dir = Some(dir.into());
        self
    }

    /// Validate the configuration, wire collaborators and load any
    /// persisted token.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The public key cannot be loaded
    /// - The machine id cannot be computed
    /// - Online activation is required but no validation service exists
    pub async fn build(self) -> Result<LicenseManager, KeywardenError> {
        self.config.validate()?;

        let parser = KeyParser::new(SignatureVerifier::from_pem(self.config.public_key_pem)?);
        let machine_id = self
            .machine_id
            .unwrap_or_else(|| Arc::new(HostMachineId))
            .machine_id()?;

        let protector = self
            .protector
            .unwrap_or_else(|| Arc::new(MachineScopedProtector::for_current_user(&machine_id)));
        let store = match self.token_dir {
            Some(dir) => TokenStore::with_path(dir, protector),
            None => TokenStore::new(self.config.token_namespace, protector)?,
        };

        let revalidation = self.revalidation.or_else(|| {
            self.config.online.as_ref().map(|online| {
                Arc::new(HttpRevalidationClient::new(self.config.app_name, online))
                    as Arc<dyn RevalidationService>
            })
        });
        if self.config.require_online_activation && revalidation.is_none() {
            return Err(KeywardenError::ConfigError(
                "require_online_activation needs a validation service".to_string(),
            ));
        }

        let manager = LicenseManager {
            factory: TokenFactory::new(self.config.token_secret),
            config: self.config,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            parser,
            store,
            revalidation,
            machine_id,
            current: RwLock::new(None),
            write_lock: Mutex::new(()),
        };

        manager.load().await;
        Ok(manager)
    }
}

/// Main license manager for Keywarden.
///
/// This is the primary public API. Create one instance per application
/// and share it (it is `Send + Sync`).
pub struct LicenseManager {
    config: KeywardenConfig,
    clock: Arc<dyn Clock>,
    parser: KeyParser,
    factory: TokenFactory,
    store: TokenStore,
    revalidation: Option<Arc<dyn RevalidationService>>,
    machine_id: String,
    current: RwLock<Option<Arc<ActivationToken>>>,
    write_lock: Mutex<()>,
}

impl LicenseManager {
    /// Create a license manager with production defaults.
    pub async fn new(config: KeywardenConfig) -> Result<Self, KeywardenError> {
        LicenseManagerBuilder::new(config).build().await
    }

    /// Start a builder.
    pub fn builder(config: KeywardenConfig) -> LicenseManagerBuilder {
        LicenseManagerBuilder::new(config)
    }

    /// Fingerprint of this machine.
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Activate a product key.
    ///
    /// `raw` is the activation text: the dash-grouped key followed by its
    /// signature block. Either the license is fully activated (token built,
    /// persisted and cached) or prior state is left untouched.
    ///
    /// # Errors
    /// - `InvalidFormat` / `InvalidChecksum` / `InvalidSignature` - Key rejected
    /// - `Expired` - Key's expiration has passed
    /// - `AlreadyActivated` - This key is already active here, or the
    ///   service reports it bound elsewhere
    /// - `Revoked` / `NotFound` / `MaxActivationsReached` - Service refused
    /// - `NetworkError` - Service unreachable and online activation required
    /// - `Unknown` - Persistence failure or unexpected service answer
    pub async fn activate(&self, raw: &str) -> Result<LicenseInfo, ActivationError> {
        let key = self.parser.parse(raw).map_err(|rejection| {
            warn!(reason = %rejection, "product key rejected");
            ActivationError::from(rejection)
        })?;

        let _guard = self.write_lock.lock().await;

        let now = self.clock.now_utc();
        if key.is_expired_at(now) {
            warn!(customer_id = key.customer_id, "product key expired");
            return Err(ActivationError::Expired);
        }

        let key_hash = hash_product_key(&key.key_text);
        if let Some(current) = self.current_token() {
            if current.product_key_hash == key_hash && !current.is_expired_at(now) {
                return Err(ActivationError::AlreadyActivated);
            }
        }

        let online_validation = self.confirm_online(&key_hash).await?;

        let token = self
            .factory
            .create(&key, &self.machine_id, now, online_validation)
            .map_err(|e| ActivationError::Unknown(e.to_string()))?;
        self.store
            .save(&token)
            .await
            .map_err(|e| ActivationError::Unknown(e.to_string()))?;

        let info = LicenseInfo::from_token(&token, now);
        self.replace(Some(token));

        info!(
            key = short_hash(&key_hash),
            license_type = %key.license_type,
            online_validation,
            "product key activated"
        );
        Ok(info)
    }

    /// Current license, projected against the clock.
    pub async fn get_license_info(&self) -> LicenseInfo {
        let now = self.clock.now_utc();
        match self.current_token() {
            Some(token) => LicenseInfo::from_token(&token, now),
            None => LicenseInfo::not_activated(),
        }
    }

    /// Whether the stored license is an Admin license.
    ///
    /// Reflects the stored type regardless of expiration.
    pub async fn is_admin_license(&self) -> bool {
        self.current_token()
            .is_some_and(|token| token.license_type == LicenseType::Admin)
    }

    /// Check that the license is usable and grants `required_features`.
    pub async fn check_features(&self, required_features: &[&str]) -> Result<(), KeywardenError> {
        check_access(&self.get_license_info().await, required_features)
    }

    /// Whether the revalidation interval has elapsed since the token was
    /// last validated. Always false without a token or validation service.
    pub async fn revalidation_due(&self) -> bool {
        if self.revalidation.is_none() {
            return false;
        }
        let Some(token) = self.current_token() else {
            return false;
        };

        let elapsed = self.clock.now_utc().signed_duration_since(token.validated_date);
        elapsed
            .to_std()
            .map(|elapsed| elapsed >= self.config.revalidation_interval)
            .unwrap_or(false)
    }

    /// Ask the validation service about the current token.
    ///
    /// - `Valid`: token resealed with a fresh validation date
    /// - `Revoked` / `NotFound`: token removed, error returned
    /// - Network failure: token untouched, `NetworkError` returned
    /// - Without a token or validation service: current info, no request
    pub async fn revalidate(&self) -> Result<LicenseInfo, ActivationError> {
        let _guard = self.write_lock.lock().await;

        let (Some(token), Some(service)) = (self.current_token(), self.revalidation.as_ref()) else {
            return Ok(self.get_license_info().await);
        };
        let key = short_hash(&token.product_key_hash).to_string();

        let status = match service.check(&token.product_key_hash, &self.machine_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(key = %key, error = %e, "revalidation failed, keeping local token");
                return Err(ActivationError::NetworkError);
            }
        };

        let now = self.clock.now_utc();
        match status {
            OnlineStatus::Valid => {
                let next = self
                    .factory
                    .revalidated(&token, now, true)
                    .map_err(|e| ActivationError::Unknown(e.to_string()))?;
                self.store
                    .save(&next)
                    .await
                    .map_err(|e| ActivationError::Unknown(e.to_string()))?;

                let info = LicenseInfo::from_token(&next, now);
                self.replace(Some(next));
                info!(key = %key, "license revalidated");
                Ok(info)
            }
            OnlineStatus::Revoked | OnlineStatus::NotFound => {
                let error = if status == OnlineStatus::Revoked {
                    ActivationError::Revoked
                } else {
                    ActivationError::NotFound
                };
                // Drop the cached slot even if the file cannot be deleted.
                self.replace(None);
                if let Err(e) = self.store.clear().await {
                    warn!(key = %key, error = %e, "failed to delete withdrawn token");
                }
                warn!(key = %key, status = %status, "license withdrawn by validation service");
                Err(error)
            }
            OnlineStatus::AlreadyActivated | OnlineStatus::MaxActivationsReached => {
                warn!(key = %key, status = %status, "activation count answer on revalidation, keeping local token");
                Ok(LicenseInfo::from_token(&token, now))
            }
            OnlineStatus::Unknown(code) => {
                warn!(key = %key, status = %code, "unexpected revalidation answer, keeping local token");
                Err(ActivationError::Unknown(format!(
                    "unexpected validation status {}",
                    code
                )))
            }
        }
    }

    /// Remove the license from this machine.
    pub async fn deactivate(&self) -> Result<(), KeywardenError> {
        let _guard = self.write_lock.lock().await;

        self.store.clear().await?;
        if let Some(token) = self.replace(None) {
            info!(key = short_hash(&token.product_key_hash), "license deactivated");
        }
        Ok(())
    }

    /// Load and verify the persisted token into the in-memory slot.
    async fn load(&self) {
        let Some(token) = self.store.load().await else {
            return;
        };

        match self
            .factory
            .verify(&token, &self.machine_id, self.clock.now_utc())
        {
            Ok(()) => {
                info!(key = short_hash(&token.product_key_hash), "activation token loaded");
                self.replace(Some(token));
            }
            Err(e) => warn!(error = %e, "discarding activation token"),
        }
    }

    /// Ask the service about a key being activated.
    ///
    /// Returns whether the activation is corroborated online.
    async fn confirm_online(&self, key_hash: &str) -> Result<bool, ActivationError> {
        let Some(service) = self.revalidation.as_ref() else {
            return Ok(false);
        };

        match service.check(key_hash, &self.machine_id).await {
            Ok(OnlineStatus::Valid) => Ok(true),
            Ok(OnlineStatus::Revoked) => Err(ActivationError::Revoked),
            Ok(OnlineStatus::NotFound) => Err(ActivationError::NotFound),
            Ok(OnlineStatus::AlreadyActivated) => Err(ActivationError::AlreadyActivated),
            Ok(OnlineStatus::MaxActivationsReached) => Err(ActivationError::MaxActivationsReached),
            Ok(OnlineStatus::Unknown(code)) => Err(ActivationError::Unknown(format!(
                "unexpected validation status {}",
                code
            ))),
            Err(e) if self.config.require_online_activation => {
                warn!(key = short_hash(key_hash), error = %e, "validation service unreachable");
                Err(ActivationError::NetworkError)
            }
            Err(e) => {
                warn!(key = short_hash(key_hash), error = %e, "validation service unreachable, activating offline");
                Ok(false)
            }
        }
    }

    fn current_token(&self) -> Option<Arc<ActivationToken>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap the cached token, returning the previous one.
    fn replace(&self, token: Option<ActivationToken>) -> Option<Arc<ActivationToken>> {
        let mut slot = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *slot, token.map(Arc::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::issuer::KeyIssuer;
    use crate::machine::StaticMachineId;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const DEV_SIGNING_KEY: &str = include_str!("../tests/fixtures/dev_signing_key.pem");

    struct FixedService {
        answer: Result<OnlineStatus, ()>,
        calls: AtomicUsize,
    }

    impl FixedService {
        fn new(answer: Result<OnlineStatus, ()>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RevalidationService for FixedService {
        async fn check(&self, _key_hash: &str, _machine_id: &str) -> Result<OnlineStatus, KeywardenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .clone()
                .map_err(|_| KeywardenError::Transport("offline".to_string()))
        }
    }

    fn config() -> KeywardenConfig {
        KeywardenConfig::offline("guidebook/1.0.0", "guidebook-test", "0123456789abcdef")
    }

    fn clock() -> Arc<MockClock> {
        Arc::new(MockClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()))
    }

    fn builder(dir: &TempDir, clock: Arc<MockClock>) -> LicenseManagerBuilder {
        LicenseManager::builder(config())
            .clock(clock)
            .machine_id(Arc::new(StaticMachineId("machine-a".to_string())))
            .protector(Arc::new(MachineScopedProtector::new("machine-a", "tester")))
            .token_dir(dir.path())
    }

    fn admin_key() -> String {
        KeyIssuer::from_pem(DEV_SIGNING_KEY)
            .unwrap()
            .issue_license(LicenseType::Admin, None, 42, 0)
            .unwrap()
            .activation_text()
    }

    #[tokio::test]
    async fn test_activate_offline() {
        let dir = TempDir::new().unwrap();
        let manager = builder(&dir, clock()).build().await.unwrap();

        let info = manager.activate(&admin_key()).await.unwrap();
        assert!(info.is_activated);
        assert!(!info.online_validation);
        assert!(manager.is_admin_license().await);
        assert!(manager.check_features(&["edit_guides"]).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_key_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let manager = builder(&dir, clock()).build().await.unwrap();
        manager.activate(&admin_key()).await.unwrap();

        let result = manager.activate("11111-11111-11111-11111-11111").await;
        assert_eq!(result, Err(ActivationError::InvalidChecksum));
        assert!(manager.get_license_info().await.is_activated);
    }

    #[tokio::test]
    async fn test_same_key_twice_is_already_activated() {
        let dir = TempDir::new().unwrap();
        let manager = builder(&dir, clock()).build().await.unwrap();
        let key = admin_key();

        manager.activate(&key).await.unwrap();
        assert_eq!(
            manager.activate(&key).await,
            Err(ActivationError::AlreadyActivated)
        );
    }

    #[tokio::test]
    async fn test_service_rejections_map_to_errors() {
        let cases = [
            (OnlineStatus::Revoked, ActivationError::Revoked),
            (OnlineStatus::NotFound, ActivationError::NotFound),
            (OnlineStatus::AlreadyActivated, ActivationError::AlreadyActivated),
            (
                OnlineStatus::MaxActivationsReached,
                ActivationError::MaxActivationsReached,
            ),
        ];

        for (status, expected) in cases {
            let dir = TempDir::new().unwrap();
            let manager = builder(&dir, clock())
                .revalidation_service(FixedService::new(Ok(status)))
                .build()
                .await
                .unwrap();

            assert_eq!(manager.activate(&admin_key()).await, Err(expected));
            assert!(!manager.get_license_info().await.is_activated);
            assert!(!manager.store.path().exists());
        }
    }

    #[tokio::test]
    async fn test_network_error_activates_offline() {
        let dir = TempDir::new().unwrap();
        let service = FixedService::new(Err(()));
        let manager = builder(&dir, clock())
            .revalidation_service(service.clone())
            .build()
            .await
            .unwrap();

        let info = manager.activate(&admin_key()).await.unwrap();
        assert!(!info.online_validation);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_network_error_blocks_when_online_required() {
        let dir = TempDir::new().unwrap();
        let manager = LicenseManager::builder(KeywardenConfig {
            require_online_activation: true,
            ..config()
        })
        .clock(clock())
        .machine_id(Arc::new(StaticMachineId("machine-a".to_string())))
        .protector(Arc::new(MachineScopedProtector::new("machine-a", "tester")))
        .token_dir(dir.path())
        .revalidation_service(FixedService::new(Err(())))
        .build()
        .await
        .unwrap();

        assert_eq!(
            manager.activate(&admin_key()).await,
            Err(ActivationError::NetworkError)
        );
    }

    #[tokio::test]
    async fn test_online_required_without_service_is_config_error() {
        let dir = TempDir::new().unwrap();
        let result = LicenseManager::builder(KeywardenConfig {
            require_online_activation: true,
            ..config()
        })
        .machine_id(Arc::new(StaticMachineId("machine-a".to_string())))
        .token_dir(dir.path())
        .build()
        .await;

        assert!(matches!(result, Err(KeywardenError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_revalidation_due_after_interval() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let manager = builder(&dir, clock.clone())
            .revalidation_service(FixedService::new(Ok(OnlineStatus::Valid)))
            .build()
            .await
            .unwrap();

        assert!(!manager.revalidation_due().await);
        manager.activate(&admin_key()).await.unwrap();
        assert!(!manager.revalidation_due().await);

        clock.advance(Duration::days(31));
        assert!(manager.revalidation_due().await);

        manager.revalidate().await.unwrap();
        assert!(!manager.revalidation_due().await);
    }

    #[tokio::test]
    async fn test_deactivate_clears_token() {
        let dir = TempDir::new().unwrap();
        let manager = builder(&dir, clock()).build().await.unwrap();
        manager.activate(&admin_key()).await.unwrap();

        manager.deactivate().await.unwrap();
        assert!(!manager.get_license_info().await.is_activated);
        assert!(!manager.is_admin_license().await);
        assert!(!manager.store.path().exists());
    }
}
