//! Vault settings and on-disk layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use phantomvault_common::{Error, FolderId, ProfileId, Result, SagaOperation};
use phantomvault_crypto::KdfParams;
use phantomvault_storage::DocumentStore;

/// Credential store file name in the data root.
pub const CREDENTIALS_FILENAME: &str = "credentials.store";

/// Settings file name in the data root.
pub const SETTINGS_FILENAME: &str = "settings.json";

/// Directory holding one registry document per profile.
pub const REGISTRIES_DIRNAME: &str = "registries";

/// Directory holding currently-locked folder trees.
pub const VAULTS_DIRNAME: &str = "vaults";

/// Directory holding pre-operation snapshots.
pub const BACKUPS_DIRNAME: &str = "backups";

/// Extension of registry documents.
pub const REGISTRY_EXTENSION: &str = "registry";

/// Application directory name under the platform data directory.
pub const APP_DIRNAME: &str = "phantomvault";

/// Minimum length of master and custom folder passwords.
pub const MIN_PASSWORD_LENGTH: usize = 4;

fn default_kdf_iterations() -> u32 {
    phantomvault_crypto::kdf::DEFAULT_ITERATIONS
}

fn default_backup_retention() -> usize {
    3
}

fn default_password_cache_ttl_secs() -> u64 {
    300
}

/// User-tunable settings, loaded from `settings.json` in the data root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSettings {
    /// PBKDF2 iterations for password hashes, wrapped secrets and store keys.
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
    /// Backups kept per folder.
    #[serde(default = "default_backup_retention")]
    pub backup_retention: usize,
    /// Lifetime of the cached master password.
    #[serde(default = "default_password_cache_ttl_secs")]
    pub password_cache_ttl_secs: u64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            kdf_iterations: default_kdf_iterations(),
            backup_retention: default_backup_retention(),
            password_cache_ttl_secs: default_password_cache_ttl_secs(),
        }
    }
}

impl VaultSettings {
    /// KDF parameters derived from these settings.
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::new(self.kdf_iterations)
    }

    /// Password cache lifetime.
    pub fn password_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.password_cache_ttl_secs)
    }

    /// Check that the settings are usable.
    ///
    /// # Errors
    /// - Zero iterations or zero retention
    pub fn validate(&self) -> Result<()> {
        if self.kdf_iterations == 0 {
            return Err(Error::Validation(
                "kdf_iterations must be positive".to_string(),
            ));
        }
        if self.backup_retention == 0 {
            return Err(Error::Validation(
                "backup_retention must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load settings from the layout's settings file, falling back to defaults.
    ///
    /// # Errors
    /// - Settings file exists but is not valid JSON
    /// - Settings fail validation
    pub async fn load(store: &dyn DocumentStore, layout: &VaultLayout) -> Result<Self> {
        let path = layout.settings_path();
        if !store.exists(&path).await? {
            return Ok(Self::default());
        }
        let settings = Self::from_json(&store.read(&path).await?)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize settings from JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Derives every on-disk path from a single data root.
///
/// The data root is per OS user, so profiles of different users never
/// share a credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultLayout {
    root: PathBuf,
}

impl VaultLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Platform default: `<data_local_dir>/phantomvault`.
    ///
    /// # Errors
    /// - The platform has no per-user data directory
    pub fn default_root() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIRNAME))
            .ok_or_else(|| Error::NotFound("No per-user data directory".to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILENAME)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.root.join(CREDENTIALS_FILENAME)
    }

    pub fn registry_path(&self, profile_id: &ProfileId) -> PathBuf {
        self.root
            .join(REGISTRIES_DIRNAME)
            .join(format!("{}.{}", profile_id, REGISTRY_EXTENSION))
    }

    /// Deterministic vault location of a locked folder.
    pub fn vault_path(&self, profile_id: &ProfileId, folder_id: &FolderId, folder_name: &str) -> PathBuf {
        self.root
            .join(VAULTS_DIRNAME)
            .join(profile_id.as_str())
            .join(format!("{}-{}", folder_id, folder_name))
    }

    /// Directory holding every backup of one folder.
    pub fn folder_backups_dir(&self, profile_id: &ProfileId, folder_id: &FolderId) -> PathBuf {
        self.root
            .join(BACKUPS_DIRNAME)
            .join(profile_id.as_str())
            .join(folder_id.as_str())
    }

    /// Snapshot location for one backup.
    pub fn backup_path(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        timestamp: DateTime<Utc>,
        operation: SagaOperation,
        folder_name: &str,
    ) -> PathBuf {
        self.folder_backups_dir(profile_id, folder_id)
            .join(format!(
                "{}-{}",
                timestamp.format("%Y%m%dT%H%M%S%.6fZ"),
                operation
            ))
            .join(folder_name)
    }

    /// True if `path` lies inside the data root.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}
