//! Folder registry: the managed folders of one profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::VaultLayout;
use crate::document::SealedFile;
use phantomvault_common::{Error, FolderId, ProfileId, Result};
use phantomvault_crypto::{PasswordHash, StoreKeys, WrappedSecret};
use phantomvault_storage::DocumentStore;

/// How a folder was last unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockMode {
    /// Decrypted until the next lock, suspend or quit event.
    Temporary,
    /// Decrypted and removed from vault management.
    Permanent,
}

impl std::fmt::Display for UnlockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnlockMode::Temporary => write!(f, "temporary"),
            UnlockMode::Permanent => write!(f, "permanent"),
        }
    }
}

/// A pre-operation snapshot of a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub timestamp: DateTime<Utc>,
    pub path: PathBuf,
    pub operation: String,
}

/// One managed folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderEntry {
    pub id: FolderId,
    pub folder_name: String,
    /// Home location. Retained while locked so unlock knows where to restore.
    #[serde(default)]
    pub original_path: Option<PathBuf>,
    /// Vault location. Set if and only if the folder is locked.
    #[serde(default)]
    pub vault_path: Option<PathBuf>,
    pub is_locked: bool,
    #[serde(default)]
    pub unlock_mode: Option<UnlockMode>,
    pub uses_master_password: bool,
    #[serde(default)]
    pub custom_password_hash: Option<PasswordHash>,
    #[serde(default)]
    pub custom_recovery_key_hash: Option<PasswordHash>,
    /// Custom recovery key wrapped under the custom password.
    #[serde(default)]
    pub encrypted_custom_recovery_key: Option<WrappedSecret>,
    /// Custom password wrapped under the custom recovery key.
    #[serde(default)]
    pub custom_password_encrypted_with_recovery: Option<WrappedSecret>,
    #[serde(default)]
    pub backups: Vec<BackupRecord>,
    #[serde(default)]
    pub last_unlocked: Option<DateTime<Utc>>,
}

impl FolderEntry {
    /// Entries from older installations may lack paths and cannot be unlocked.
    pub fn is_legacy(&self) -> bool {
        self.original_path.is_none() || (self.is_locked && self.vault_path.is_none())
    }
}

/// Persisted registry document of one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRegistry {
    pub profile_id: ProfileId,
    pub folders: Vec<FolderEntry>,
    pub last_modified: DateTime<Utc>,
}

impl FolderRegistry {
    pub fn new(profile_id: ProfileId) -> Self {
        Self {
            profile_id,
            folders: Vec::new(),
            last_modified: Utc::now(),
        }
    }

    pub fn find(&self, id: &FolderId) -> Option<&FolderEntry> {
        self.folders.iter().find(|f| &f.id == id)
    }

    /// Look up a folder or fail with `NotFound`.
    pub fn require(&self, id: &FolderId) -> Result<&FolderEntry> {
        self.find(id)
            .ok_or_else(|| Error::NotFound(format!("Folder not found: {}", id)))
    }

    pub fn require_mut(&mut self, id: &FolderId) -> Result<&mut FolderEntry> {
        self.folders
            .iter_mut()
            .find(|f| &f.id == id)
            .ok_or_else(|| Error::NotFound(format!("Folder not found: {}", id)))
    }

    /// Remove and return a folder entry.
    pub fn remove(&mut self, id: &FolderId) -> Result<FolderEntry> {
        let index = self
            .folders
            .iter()
            .position(|f| &f.id == id)
            .ok_or_else(|| Error::NotFound(format!("Folder not found: {}", id)))?;
        Ok(self.folders.remove(index))
    }

    pub fn has_locked_folders(&self) -> bool {
        self.folders.iter().any(|f| f.is_locked)
    }
}

/// Single-writer access to every profile's registry document.
pub struct FolderRegistryStore {
    store: Arc<dyn DocumentStore>,
    layout: VaultLayout,
    keys: StoreKeys,
    writers: std::sync::Mutex<HashMap<ProfileId, Arc<Mutex<()>>>>,
}

impl FolderRegistryStore {
    pub fn new(store: Arc<dyn DocumentStore>, layout: VaultLayout, keys: StoreKeys) -> Self {
        Self {
            store,
            layout,
            keys,
            writers: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn file(&self, profile_id: &ProfileId) -> SealedFile {
        SealedFile::new(
            self.store.clone(),
            self.layout.registry_path(profile_id),
            &self.keys,
            &format!("registry:{}", profile_id),
        )
    }

    fn writer(&self, profile_id: &ProfileId) -> Result<Arc<Mutex<()>>> {
        let mut writers = self
            .writers
            .lock()
            .map_err(|_| Error::Resource("Registry writer map poisoned".to_string()))?;
        Ok(writers
            .entry(profile_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Read a profile's registry. A missing document reads as empty.
    ///
    /// # Errors
    /// - Integrity error on decryption or tag failure
    pub async fn load(&self, profile_id: &ProfileId) -> Result<FolderRegistry> {
        let registry: Option<FolderRegistry> = self.file(profile_id).load().await?;
        match registry {
            Some(registry) if &registry.profile_id != profile_id => Err(Error::Integrity(
                "Registry belongs to a different profile".to_string(),
            )),
            Some(registry) => Ok(registry),
            None => Ok(FolderRegistry::new(profile_id.clone())),
        }
    }

    /// Read one folder entry.
    pub async fn get(&self, profile_id: &ProfileId, folder_id: &FolderId) -> Result<FolderEntry> {
        self.load(profile_id).await?.require(folder_id).cloned()
    }

    /// Read, mutate and rewrite a registry while holding its writer lock.
    ///
    /// Nothing is written if `mutate` returns an error.
    pub async fn update<R, F>(&self, profile_id: &ProfileId, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut FolderRegistry) -> Result<R>,
    {
        let writer = self.writer(profile_id)?;
        let _writer = writer.lock().await;

        let mut registry = self.load(profile_id).await?;
        let result = mutate(&mut registry)?;
        registry.last_modified = Utc::now();
        self.file(profile_id).save(&registry).await?;
        debug!(profile_id = %profile_id, folders = registry.folders.len(), "Registry written");
        Ok(result)
    }

    /// Delete a profile's registry document.
    pub async fn delete(&self, profile_id: &ProfileId) -> Result<()> {
        let writer = self.writer(profile_id)?;
        let _writer = writer.lock().await;
        self.file(profile_id).delete().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phantomvault_crypto::keys::KEY_LENGTH;
    use phantomvault_storage::MemoryDocumentStore;

    fn entry(name: &str) -> FolderEntry {
        FolderEntry {
            id: FolderId::generate(),
            folder_name: name.to_string(),
            original_path: Some(PathBuf::from("/home/user").join(name)),
            vault_path: None,
            is_locked: false,
            unlock_mode: None,
            uses_master_password: true,
            custom_password_hash: None,
            custom_recovery_key_hash: None,
            encrypted_custom_recovery_key: None,
            custom_password_encrypted_with_recovery: None,
            backups: Vec::new(),
            last_unlocked: None,
        }
    }

    fn registry_store(documents: &MemoryDocumentStore) -> FolderRegistryStore {
        FolderRegistryStore::new(
            Arc::new(documents.clone()),
            VaultLayout::new("/data"),
            StoreKeys::from_material(&[9u8; KEY_LENGTH * 2]),
        )
    }

    #[tokio::test]
    async fn test_missing_registry_is_empty() {
        let store = registry_store(&MemoryDocumentStore::new());
        let profile = ProfileId::generate();
        let registry = store.load(&profile).await.unwrap();

        assert_eq!(registry.profile_id, profile);
        assert!(registry.folders.is_empty());
    }

    #[tokio::test]
    async fn test_update_and_get() {
        let store = registry_store(&MemoryDocumentStore::new());
        let profile = ProfileId::generate();
        let folder = entry("Taxes");
        let id = folder.id.clone();

        store
            .update(&profile, |reg| {
                reg.folders.push(folder);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(store.get(&profile, &id).await.unwrap().folder_name, "Taxes");
        assert!(matches!(
            store.get(&profile, &FolderId::generate()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_registries_are_per_profile() {
        let documents = MemoryDocumentStore::new();
        let store = registry_store(&documents);
        let alice = ProfileId::generate();
        let bob = ProfileId::generate();

        store
            .update(&alice, |reg| {
                reg.folders.push(entry("A"));
                Ok(())
            })
            .await
            .unwrap();

        assert!(store.load(&bob).await.unwrap().folders.is_empty());

        // A registry copied over another profile's path is rejected.
        let raw = documents
            .read(&VaultLayout::new("/data").registry_path(&alice))
            .await
            .unwrap();
        documents
            .overwrite_raw(&VaultLayout::new("/data").registry_path(&bob), raw)
            .unwrap();
        assert!(matches!(store.load(&bob).await, Err(Error::Integrity(_))));
    }

    #[test]
    fn test_legacy_detection() {
        let mut folder = entry("Old");
        assert!(!folder.is_legacy());

        folder.is_locked = true;
        assert!(folder.is_legacy());

        folder.vault_path = Some(PathBuf::from("/data/vaults/p/x"));
        assert!(!folder.is_legacy());

        folder.original_path = None;
        assert!(folder.is_legacy());
    }

    #[test]
    fn test_entry_missing_paths_deserializes() {
        let json = serde_json::json!({
            "id": "f1",
            "folder_name": "Old",
            "is_locked": true,
            "uses_master_password": true
        });
        let folder: FolderEntry = serde_json::from_value(json).unwrap();
        assert!(folder.is_legacy());
        assert!(folder.backups.is_empty());
    }
}
