//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use keywarden::{
    Clock, KeyIssuer, KeywardenConfig, KeywardenError, LicenseManager, LicenseManagerBuilder,
    LicenseType, MachineScopedProtector, OnlineStatus, RevalidationService, StaticMachineId,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const DEV_SIGNING_KEY: &str = include_str!("../fixtures/dev_signing_key.pem");
pub const FOREIGN_SIGNING_KEY: &str = include_str!("../fixtures/foreign_signing_key.pem");

pub const TOKEN_SECRET: &str = "integration-test-secret";

/// Advanceable clock shared between a test and its manager.
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for TestClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
}

/// Validation service answering from a script; `Err(())` is a network
/// failure. Repeats the last answer once the script runs out.
pub struct ScriptedService {
    answers: Mutex<VecDeque<Result<OnlineStatus, ()>>>,
    pub calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new(answers: Vec<Result<OnlineStatus, ()>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RevalidationService for ScriptedService {
    async fn check(&self, key_hash: &str, machine_id: &str) -> Result<OnlineStatus, KeywardenError> {
        assert_eq!(key_hash.len(), 64);
        assert!(!machine_id.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut answers = self.answers.lock().unwrap();
        let answer = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().cloned()
        };

        match answer {
            Some(Ok(status)) => Ok(status),
            Some(Err(())) | None => Err(KeywardenError::Transport("connection refused".to_string())),
        }
    }
}

pub fn config() -> KeywardenConfig {
    KeywardenConfig::offline("guidebook/1.0.0", "guidebook-it", TOKEN_SECRET)
}

/// Builder wired to a temp dir, a fixed machine and a fixed principal.
pub fn builder(dir: &TempDir, clock: Arc<TestClock>) -> LicenseManagerBuilder {
    builder_on(dir, clock, "machine-a")
}

pub fn builder_on(dir: &TempDir, clock: Arc<TestClock>, machine: &str) -> LicenseManagerBuilder {
    LicenseManager::builder(config())
        .clock(clock)
        .machine_id(Arc::new(StaticMachineId(machine.to_string())))
        .protector(Arc::new(MachineScopedProtector::new("machine-a", "tester")))
        .token_dir(dir.path())
}

pub fn issuer() -> KeyIssuer {
    KeyIssuer::from_pem(DEV_SIGNING_KEY).unwrap()
}

/// Activation text for a freshly signed key.
pub fn issue(
    license_type: LicenseType,
    expires_at: Option<DateTime<Utc>>,
    customer_id: u32,
    flags: u8,
) -> String {
    issuer()
        .issue_license(license_type, expires_at, customer_id, flags)
        .unwrap()
        .activation_text()
}
