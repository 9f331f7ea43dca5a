//! Machine fingerprinting.
//!
//! The fingerprint is a stable hash of host characteristics. It binds an
//! activation token to the machine that activated it.

use crate::crypto::digest::sha256_hex;
use crate::KeywardenError;
use std::env;

/// Source of a stable machine identifier.
pub trait MachineIdProvider: Send + Sync {
    /// Return the identifier for this machine.
    fn machine_id(&self) -> Result<String, KeywardenError>;
}

/// Fingerprint built from the host: OS, architecture, hostname and the
/// platform machine id where one exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostMachineId;

impl MachineIdProvider for HostMachineId {
    fn machine_id(&self) -> Result<String, KeywardenError> {
        let hostname = hostname::get()
            .map_err(|e| KeywardenError::MachineId(format!("hostname lookup failed: {}", e)))?
            .to_string_lossy()
            .into_owned();

        let mut components = vec![
            env::consts::OS.to_string(),
            env::consts::ARCH.to_string(),
            hostname,
        ];

        if let Some(platform_id) = platform_machine_id() {
            components.push(platform_id);
        }

        Ok(sha256_hex(components.join("|").as_bytes()))
    }
}

/// Fixed identifier supplied by the embedding application.
#[derive(Debug, Clone)]
pub struct StaticMachineId(pub String);

impl MachineIdProvider for StaticMachineId {
    fn machine_id(&self) -> Result<String, KeywardenError> {
        if self.0.is_empty() {
            return Err(KeywardenError::MachineId("empty machine id".to_string()));
        }
        Ok(self.0.clone())
    }
}

#[cfg(target_os = "linux")]
fn platform_machine_id() -> Option<String> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .find_map(|path| std::fs::read_to_string(path).ok())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(target_os = "macos")]
fn platform_machine_id() -> Option<String> {
    let output = std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find(|line| line.contains("IOPlatformUUID"))
        .and_then(|line| line.split('=').nth(1))
        .map(|value| value.trim().trim_matches('"').to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(target_os = "windows")]
fn platform_machine_id() -> Option<String> {
    let output = std::process::Command::new("reg")
        .args([
            "query",
            r"HKLM\SOFTWARE\Microsoft\Cryptography",
            "/v",
            "MachineGuid",
        ])
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find(|line| line.contains("MachineGuid"))
        .and_then(|line| line.split_whitespace().last())
        .map(str::to_string)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn platform_machine_id() -> Option<String> {
    None
}
