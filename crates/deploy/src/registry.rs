//! Contract registry store.
//!
//! The registry is a single JSON file mapping network names to the proxy addresses
//! recorded on that network:
//!
//! ```json
//! {
//!   "mainnet": { "meeting": "0x1111111111111111111111111111111111111111" }
//! }
//! ```
//!
//! Saves never rewrite the file in place. The new content goes to a sibling temp file which
//! is synced and then renamed over the store, so a crash or I/O failure leaves the previous
//! registry intact.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use derive_more::{Deref, DerefMut, From};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// Default location of the registry file, relative to the working directory.
pub const DEFAULT_REGISTRY_PATH: &str = "deployments/contracts.json";

/// Contract name to address records for a single network.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref, DerefMut, From,
)]
#[serde(transparent)]
pub struct NetworkRegistry(BTreeMap<String, String>);

impl NetworkRegistry {
    /// The recorded address for `name`, if any.
    pub fn address_of(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// The whole registry file, keyed by network.
pub type RegistryFile = BTreeMap<String, NetworkRegistry>;

/// File-backed contract registry.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    path: PathBuf,
}

impl ContractRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the records for `network`.
    ///
    /// A missing registry file means nothing was deployed yet and yields an empty registry.
    /// A file that exists but cannot be parsed is an error.
    pub fn load(&self, network: &str) -> Result<NetworkRegistry, DeployError> {
        let mut all = self.load_all()?;
        Ok(all.remove(network).unwrap_or_default())
    }

    /// Load the records for every network.
    pub fn load_all(&self) -> Result<RegistryFile, DeployError> {
        self.read_file()
            .map_err(|e| DeployError::StoreIo(DeployError::chain(&e)))
    }

    /// Insert or replace the address recorded for `name` on `network`, then persist the
    /// full registry.
    pub fn save(&self, network: &str, name: &str, address: &str) -> Result<(), DeployError> {
        self.save_inner(network, name, address)
            .map_err(|e| DeployError::StoreIo(DeployError::chain(&e)))
    }

    fn save_inner(&self, network: &str, name: &str, address: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.parent_dir() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create registry directory {}", parent.display())
            })?;
        }

        let lock = self.lock()?;

        let mut all = self.read_file()?;
        let previous = all
            .entry(network.to_string())
            .or_default()
            .insert(name.to_string(), address.to_string());

        self.write_file(&all)?;

        FileExt::unlock(&lock).context("Failed to release registry lock")?;

        tracing::info!(
            registry = %self.path.display(),
            network,
            contract = name,
            address,
            previous = ?previous,
            "Contract address saved"
        );

        Ok(())
    }

    fn read_file(&self) -> anyhow::Result<RegistryFile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(registry = %self.path.display(), "Registry file not found, starting empty");
                return Ok(RegistryFile::new());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read registry from {}", self.path.display())
                });
            }
        };

        serde_json::from_str(&content).with_context(|| {
            format!(
                "Registry file {} is corrupt; refusing to treat it as empty",
                self.path.display()
            )
        })
    }

    fn write_file(&self, all: &RegistryFile) -> anyhow::Result<()> {
        let mut json =
            serde_json::to_string_pretty(all).context("Failed to serialize contract registry")?;
        json.push('\n');

        let tmp_path = self.sibling("tmp");

        let mut tmp = File::create(&tmp_path)
            .with_context(|| format!("Failed to create temp registry {}", tmp_path.display()))?;
        let written = tmp
            .write_all(json.as_bytes())
            .and_then(|_| tmp.sync_all())
            .with_context(|| format!("Failed to write temp registry {}", tmp_path.display()));

        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
        drop(tmp);

        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e).with_context(|| {
                format!("Failed to replace registry {}", self.path.display())
            });
        }

        // Make the rename itself durable.
        #[cfg(unix)]
        if let Some(parent) = self.parent_dir() {
            sync_dir(parent);
        }

        Ok(())
    }

    fn lock(&self) -> anyhow::Result<File> {
        let lock_path = self.sibling("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open registry lock {}", lock_path.display()))?;

        lock.lock_exclusive()
            .with_context(|| format!("Failed to lock registry {}", lock_path.display()))?;

        Ok(lock)
    }

    /// `<registry>.<suffix>`, next to the registry file.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }
}

/// Sync a directory entry. Runs after the rename, so the new registry is already in place
/// and a failure is only logged.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|dir| dir.sync_all()) {
        tracing::warn!(
            directory = %dir.display(),
            error = %e,
            "Failed to sync registry directory, the saved registry may not survive a crash"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const MEETING: &str = "0x283DC6Ec6DFa11c87947bF6B26e66b6522Bf15Af";
    const OTHER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    fn registry(dir: &TempDir) -> ContractRegistry {
        ContractRegistry::new(dir.path().join("deployments/contracts.json"))
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");
        let loaded = registry(&dir).load("mainnet").expect("Failed to load registry");
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");
        let registry = registry(&dir);

        registry.save("mainnet", "meeting", MEETING).expect("Failed to save");

        let loaded = registry.load("mainnet").expect("Failed to load registry");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.address_of("meeting"), Some(MEETING));
        assert!(registry.load("sepolia").expect("Failed to load").is_empty());
    }

    #[test]
    fn test_save_keeps_unrelated_entries() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");
        let registry = registry(&dir);

        registry.save("mainnet", "token", OTHER).expect("Failed to save");
        registry.save("sepolia", "meeting", OTHER).expect("Failed to save");
        registry.save("mainnet", "meeting", MEETING).expect("Failed to save");

        let mainnet = registry.load("mainnet").expect("Failed to load registry");
        assert_eq!(mainnet.address_of("meeting"), Some(MEETING));
        assert_eq!(mainnet.address_of("token"), Some(OTHER));

        let sepolia = registry.load("sepolia").expect("Failed to load registry");
        assert_eq!(sepolia.len(), 1);
        assert_eq!(sepolia.address_of("meeting"), Some(OTHER));
    }

    #[test]
    fn test_save_overwrites_existing_address() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");
        let registry = registry(&dir);

        registry.save("mainnet", "meeting", OTHER).expect("Failed to save");
        registry.save("mainnet", "meeting", MEETING).expect("Failed to save");

        let loaded = registry.load("mainnet").expect("Failed to load registry");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.address_of("meeting"), Some(MEETING));
    }

    #[test]
    fn test_resave_same_address_is_idempotent() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");
        let registry = registry(&dir);

        registry.save("mainnet", "meeting", MEETING).expect("Failed to save");
        let before = registry.load_all().expect("Failed to load registry");
        let bytes_before = std::fs::read(registry.path()).expect("Failed to read registry");

        registry.save("mainnet", "meeting", MEETING).expect("Failed to save");
        let after = registry.load_all().expect("Failed to load registry");
        let bytes_after = std::fs::read(registry.path()).expect("Failed to read registry");

        assert_eq!(before, after);
        assert_eq!(bytes_before, bytes_after);
    }

    #[test]
    fn test_address_strings_round_trip_exactly() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");
        let registry = registry(&dir);
        let lowercase = "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd";

        registry.save("mainnet", "meeting", lowercase).expect("Failed to save");

        let loaded = registry.load("mainnet").expect("Failed to load registry");
        assert_eq!(loaded.address_of("meeting"), Some(lowercase));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");
        let registry = registry(&dir);
        std::fs::create_dir_all(registry.path().parent().unwrap()).unwrap();
        std::fs::write(registry.path(), "{ invalid json }").expect("Failed to write file");

        let result = registry.load("mainnet");
        assert!(
            matches!(result, Err(DeployError::StoreIo(_))),
            "Corrupt registry should not load as empty"
        );

        let result = registry.save("mainnet", "meeting", MEETING);
        assert!(matches!(result, Err(DeployError::StoreIo(_))));
        assert_eq!(
            std::fs::read_to_string(registry.path()).unwrap(),
            "{ invalid json }"
        );
    }

    #[test]
    fn test_failed_save_leaves_store_untouched() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");
        let registry = registry(&dir);

        registry.save("mainnet", "meeting", MEETING).expect("Failed to save");
        let before = std::fs::read(registry.path()).expect("Failed to read registry");

        // A directory squatting on the temp path makes the write fail.
        std::fs::create_dir(registry.sibling("tmp")).expect("Failed to create obstacle");

        let result = registry.save("mainnet", "meeting", OTHER);
        assert!(matches!(result, Err(DeployError::StoreIo(_))));

        let after = std::fs::read(registry.path()).expect("Failed to read registry");
        assert_eq!(before, after, "Registry must be unchanged after a failed save");
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");
        let registry = registry(&dir);

        registry.save("mainnet", "meeting", MEETING).expect("Failed to save");

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(registry.path()).unwrap()).unwrap();
        assert_eq!(raw["mainnet"]["meeting"], MEETING);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_sync_failure_is_not_fatal() {
        let dir = TempDir::new("proxup-test").expect("Failed to create temp dir");

        // Only logs; the caller has already replaced the registry.
        sync_dir(&dir.path().join("missing"));
        sync_dir(dir.path());
    }
}
