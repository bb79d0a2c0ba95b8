//! Credential store: every profile of one OS user in a single sealed document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::VaultLayout;
use crate::document::SealedFile;
use phantomvault_common::{Error, ProfileId, Result};
use phantomvault_crypto::{PasswordHash, StoreKeys, WrappedSecret};
use phantomvault_storage::DocumentStore;

/// Credential document format version.
pub const CREDENTIALS_VERSION: u32 = 1;

/// A master-password-protected identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub os_user: String,
    pub master_password_hash: PasswordHash,
    pub recovery_key_hash: PasswordHash,
    /// Recovery key wrapped under the master password.
    pub encrypted_recovery_key: WrappedSecret,
    /// Master password wrapped under the recovery key.
    pub master_password_encrypted_with_recovery: WrappedSecret,
}

/// Persisted credential document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDocument {
    pub version: u32,
    pub profiles: Vec<Profile>,
    pub active_profile_id: Option<ProfileId>,
}

impl Default for CredentialDocument {
    fn default() -> Self {
        Self {
            version: CREDENTIALS_VERSION,
            profiles: Vec::new(),
            active_profile_id: None,
        }
    }
}

impl CredentialDocument {
    pub fn find(&self, id: &ProfileId) -> Option<&Profile> {
        self.profiles.iter().find(|p| &p.id == id)
    }

    pub fn find_mut(&mut self, id: &ProfileId) -> Option<&mut Profile> {
        self.profiles.iter_mut().find(|p| &p.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Look up a profile or fail with `NotFound`.
    pub fn require(&self, id: &ProfileId) -> Result<&Profile> {
        self.find(id)
            .ok_or_else(|| Error::NotFound(format!("Profile not found: {}", id)))
    }

    pub fn require_mut(&mut self, id: &ProfileId) -> Result<&mut Profile> {
        self.find_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Profile not found: {}", id)))
    }
}

/// Single-writer access to the credential document.
pub struct CredentialStore {
    file: SealedFile,
    writer: Mutex<()>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn DocumentStore>, layout: &VaultLayout, keys: &StoreKeys) -> Self {
        Self {
            file: SealedFile::new(store, layout.credentials_path(), keys, "credentials"),
            writer: Mutex::new(()),
        }
    }

    /// Read the current document. A missing store reads as empty.
    ///
    /// # Errors
    /// - Integrity error if the store was sealed on another machine or
    ///   has been modified
    pub async fn load(&self) -> Result<CredentialDocument> {
        let document: Option<CredentialDocument> = self.file.load().await?;
        Ok(document.unwrap_or_default())
    }

    /// Read, mutate and rewrite the document while holding the writer lock.
    ///
    /// Nothing is written if `mutate` returns an error.
    pub async fn update<R, F>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut CredentialDocument) -> Result<R>,
    {
        let _writer = self.writer.lock().await;
        let mut document = self.load().await?;
        let result = mutate(&mut document)?;
        self.file.save(&document).await?;
        debug!(profiles = document.profiles.len(), "Credential store written");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phantomvault_crypto::keys::KEY_LENGTH;
    use phantomvault_crypto::{wrap_secret, KdfParams};
    use phantomvault_storage::MemoryDocumentStore;

    fn profile(name: &str) -> Profile {
        let params = KdfParams::new(1_000);
        Profile {
            id: ProfileId::generate(),
            name: name.to_string(),
            created_at: Utc::now(),
            last_access_at: Utc::now(),
            os_user: "tester".to_string(),
            master_password_hash: PasswordHash::compute(b"pw", &params).unwrap(),
            recovery_key_hash: PasswordHash::compute(b"rk", &params).unwrap(),
            encrypted_recovery_key: wrap_secret(b"rk", b"pw", &params).unwrap(),
            master_password_encrypted_with_recovery: wrap_secret(b"pw", b"rk", &params).unwrap(),
        }
    }

    fn store(documents: &MemoryDocumentStore, byte: u8) -> CredentialStore {
        let keys = StoreKeys::from_material(&[byte; KEY_LENGTH * 2]);
        CredentialStore::new(
            Arc::new(documents.clone()),
            &VaultLayout::new("/data"),
            &keys,
        )
    }

    #[tokio::test]
    async fn test_empty_store_loads_default() {
        let documents = MemoryDocumentStore::new();
        let doc = store(&documents, 1).load().await.unwrap();
        assert!(doc.profiles.is_empty());
        assert!(doc.active_profile_id.is_none());
    }

    #[tokio::test]
    async fn test_update_persists() {
        let documents = MemoryDocumentStore::new();
        let credentials = store(&documents, 1);
        let p = profile("alice");
        let id = p.id.clone();

        credentials
            .update(|doc| {
                doc.profiles.push(p);
                doc.active_profile_id = Some(id.clone());
                Ok(())
            })
            .await
            .unwrap();

        let doc = credentials.load().await.unwrap();
        assert_eq!(doc.require(&id).unwrap().name, "alice");
        assert_eq!(doc.active_profile_id, Some(id));
    }

    #[tokio::test]
    async fn test_failed_mutation_writes_nothing() {
        let documents = MemoryDocumentStore::new();
        let credentials = store(&documents, 1);

        let result: Result<()> = credentials
            .update(|doc| {
                doc.profiles.push(profile("bob"));
                Err(Error::Validation("rejected".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn test_other_machine_keys_fail_integrity() {
        let documents = MemoryDocumentStore::new();
        store(&documents, 1)
            .update(|doc| {
                doc.profiles.push(profile("carol"));
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(
            store(&documents, 2).load().await,
            Err(Error::Integrity(_))
        ));
    }
}
