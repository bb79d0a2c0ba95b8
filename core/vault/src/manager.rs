//! Vault manager for opening a data root and wiring its components.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cipher::{AeadFolderCipher, FolderCipher};
use crate::config::{VaultLayout, VaultSettings, BACKUPS_DIRNAME};
use crate::credentials::{CredentialStore, Profile};
use crate::hider::{DotPrefixHider, FolderHider};
use crate::lifecycle::{EngineParts, FolderLifecycleEngine};
use crate::profile::ProfileManager;
use crate::registry::FolderRegistryStore;
use crate::session::PasswordCache;
use phantomvault_common::{Error, Password, ProfileId, Result};
use phantomvault_crypto::{KdfParams, MachineIdentity, RecoveryKey, StoreKeys};
use phantomvault_storage::{DocumentStore, FolderStore, LocalDocumentStore, LocalFolderStore};

/// Pluggable pieces of a vault manager.
pub struct VaultComponents {
    pub documents: Arc<dyn DocumentStore>,
    pub folders: Arc<dyn FolderStore>,
    pub cipher: Arc<dyn FolderCipher>,
    pub hider: Arc<dyn FolderHider>,
    pub store_keys: StoreKeys,
}

/// Explicit handle over one data root.
///
/// Owns the profile manager, the folder registries, the lifecycle engine
/// and the session password cache.
pub struct VaultManager {
    layout: VaultLayout,
    settings: VaultSettings,
    profiles: Arc<ProfileManager>,
    registry: Arc<FolderRegistryStore>,
    engine: Arc<FolderLifecycleEngine>,
    folders: Arc<dyn FolderStore>,
    cache: Arc<PasswordCache>,
}

impl VaultManager {
    /// Open the data root at `layout` with local storage and this machine's store keys.
    ///
    /// # Errors
    /// - Validation error on invalid settings
    /// - I/O errors reading the settings file
    pub async fn open(layout: VaultLayout) -> Result<Self> {
        let documents: Arc<dyn DocumentStore> = Arc::new(LocalDocumentStore::new());
        let settings = VaultSettings::load(documents.as_ref(), &layout).await?;

        // Store keys use fixed parameters so changing settings never orphans the stores.
        let store_keys = MachineIdentity::current().derive_store_keys(&KdfParams::standard())?;
        let cipher = Arc::new(AeadFolderCipher::new(settings.kdf_params()));

        info!(root = %layout.root().display(), "Vault opened");
        Ok(Self::with_components(
            layout,
            settings,
            VaultComponents {
                documents,
                folders: Arc::new(LocalFolderStore::new()),
                cipher,
                hider: Arc::new(DotPrefixHider::new()),
                store_keys,
            },
        ))
    }

    /// Build a manager from explicit components.
    pub fn with_components(layout: VaultLayout, settings: VaultSettings, components: VaultComponents) -> Self {
        let credentials = Arc::new(CredentialStore::new(
            components.documents.clone(),
            &layout,
            &components.store_keys,
        ));
        let profiles = Arc::new(ProfileManager::new(credentials, settings.kdf_params()));
        let registry = Arc::new(FolderRegistryStore::new(
            components.documents,
            layout.clone(),
            components.store_keys,
        ));
        let cache = Arc::new(PasswordCache::new(settings.password_cache_ttl()));
        let engine = Arc::new(FolderLifecycleEngine::new(EngineParts {
            registry: registry.clone(),
            profiles: profiles.clone(),
            cipher: components.cipher,
            hider: components.hider,
            folders: components.folders.clone(),
            cache: cache.clone(),
            layout: layout.clone(),
            settings: settings.clone(),
        }));

        Self {
            layout,
            settings,
            profiles,
            registry,
            engine,
            folders: components.folders,
            cache,
        }
    }

    pub fn layout(&self) -> &VaultLayout {
        &self.layout
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    pub fn profiles(&self) -> &Arc<ProfileManager> {
        &self.profiles
    }

    pub fn engine(&self) -> &Arc<FolderLifecycleEngine> {
        &self.engine
    }

    pub async fn create_profile(&self, name: &str, master_password: &Password) -> Result<(Profile, RecoveryKey)> {
        self.profiles.create_profile(name, master_password).await
    }

    pub async fn active_profile(&self) -> Result<Option<Profile>> {
        self.profiles.active_profile().await
    }

    /// Authenticate and make a profile active.
    ///
    /// The password cache is wiped before the new password is cached.
    pub async fn switch_profile(&self, profile_id: &ProfileId, password: &Password) -> Result<Profile> {
        self.profiles.authenticate(profile_id, password).await?;
        let profile = self.profiles.set_active_profile(profile_id).await?;
        self.cache.clear();
        self.cache.store(profile_id, password);
        info!(profile_id = %profile_id, "Switched profile");
        Ok(profile)
    }

    /// Forget the cached master password and the active profile.
    pub async fn sign_out(&self) -> Result<()> {
        self.cache.clear();
        self.profiles.clear_active_profile().await
    }

    /// Change a master password.
    ///
    /// # Errors
    /// - Validation error while master-password folders are locked or
    ///   tracked for relocking, since their content is keyed to the old password
    pub async fn change_password(
        &self,
        profile_id: &ProfileId,
        old_password: &Password,
        new_password: &Password,
    ) -> Result<RecoveryKey> {
        let registry = self.registry.load(profile_id).await?;
        let bound_to_master = registry
            .folders
            .iter()
            .any(|f| f.uses_master_password && f.is_locked);
        let tracked = self
            .engine
            .tracked_unlocks()
            .iter()
            .any(|t| &t.profile_id == profile_id);
        if bound_to_master || tracked {
            return Err(Error::Validation(
                "Master-password folders are locked or awaiting auto-lock; unlock them permanently first"
                    .to_string(),
            ));
        }

        let key = self
            .profiles
            .change_password(profile_id, old_password, new_password)
            .await?;
        self.cache.clear();
        Ok(key)
    }

    /// Delete a profile together with its registry and backups.
    ///
    /// # Errors
    /// - Validation error while the profile has locked folders
    /// - Authentication error on a wrong password
    pub async fn delete_profile(&self, profile_id: &ProfileId, password: &Password) -> Result<()> {
        if self.engine.has_locked_folders(profile_id).await? {
            return Err(Error::Validation(
                "Profile still has locked folders; unlock them first".to_string(),
            ));
        }
        self.profiles.delete_profile(profile_id, password).await?;
        self.engine.forget_profile(profile_id);
        self.cache.clear();
        self.registry.delete(profile_id).await?;

        let backups = self.layout.root().join(BACKUPS_DIRNAME).join(profile_id.as_str());
        let removed = match self.folders.exists(&backups).await {
            Ok(true) => self.folders.remove_tree(&backups).await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            warn!(profile_id = %profile_id, error = %e, "Could not remove profile backups");
        }
        info!(profile_id = %profile_id, "Profile and its registry deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UnlockMode;
    use phantomvault_crypto::keys::KEY_LENGTH;
    use phantomvault_storage::MemoryDocumentStore;
    use tempfile::TempDir;

    fn settings() -> VaultSettings {
        VaultSettings {
            kdf_iterations: 1_000,
            ..VaultSettings::default()
        }
    }

    fn manager(temp: &TempDir) -> VaultManager {
        VaultManager::with_components(
            VaultLayout::new(temp.path().join("data")),
            settings(),
            VaultComponents {
                documents: Arc::new(MemoryDocumentStore::new()),
                folders: Arc::new(LocalFolderStore::new()),
                cipher: Arc::new(AeadFolderCipher::new(settings().kdf_params())),
                hider: Arc::new(DotPrefixHider::new()),
                store_keys: StoreKeys::from_material(&[8u8; KEY_LENGTH * 2]),
            },
        )
    }

    fn folder(temp: &TempDir, name: &str) -> std::path::PathBuf {
        let path = temp.path().join(name);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("file.txt"), b"content").unwrap();
        path
    }

    #[tokio::test]
    async fn test_switch_profile_replaces_cache() {
        let temp = TempDir::new().unwrap();
        let vault = manager(&temp);
        let (alice, _) = vault.create_profile("Alice", &Password::new("alice-pw")).await.unwrap();
        let (bob, _) = vault.create_profile("Bob", &Password::new("bob-pw")).await.unwrap();

        vault.switch_profile(&alice.id, &Password::new("alice-pw")).await.unwrap();
        assert!(vault.cache.get(&alice.id).is_some());

        vault.switch_profile(&bob.id, &Password::new("bob-pw")).await.unwrap();
        assert!(vault.cache.get(&alice.id).is_none());
        assert_eq!(vault.active_profile().await.unwrap().unwrap().id, bob.id);

        assert!(matches!(
            vault.switch_profile(&alice.id, &Password::new("wrong")).await,
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_profile_refused_while_locked() {
        let temp = TempDir::new().unwrap();
        let vault = manager(&temp);
        let pw = Password::new("alice-pw");
        let (alice, _) = vault.create_profile("Alice", &pw).await.unwrap();
        let added = vault
            .engine()
            .add_folder(&alice.id, &folder(&temp, "Docs"), None)
            .await
            .unwrap();
        let id = added.entry.id;
        vault.engine().lock_folder_with_password(&alice.id, &id, &pw).await.unwrap();

        assert!(matches!(
            vault.delete_profile(&alice.id, &pw).await,
            Err(Error::Validation(_))
        ));

        vault
            .engine()
            .unlock_folder(&alice.id, &id, &pw, UnlockMode::Temporary)
            .await
            .unwrap();
        vault.delete_profile(&alice.id, &pw).await.unwrap();

        assert!(vault.profiles().list_profiles().await.unwrap().is_empty());
        assert!(vault.engine().tracked_unlocks().is_empty());
        assert!(vault.engine().list_folders(&alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_password_refused_with_locked_master_folders() {
        let temp = TempDir::new().unwrap();
        let vault = manager(&temp);
        let pw = Password::new("alice-pw");
        let (alice, _) = vault.create_profile("Alice", &pw).await.unwrap();
        let added = vault
            .engine()
            .add_folder(&alice.id, &folder(&temp, "Docs"), None)
            .await
            .unwrap();
        vault
            .engine()
            .lock_folder_with_password(&alice.id, &added.entry.id, &pw)
            .await
            .unwrap();

        assert!(matches!(
            vault.change_password(&alice.id, &pw, &Password::new("new-pw")).await,
            Err(Error::Validation(_))
        ));

        vault
            .engine()
            .unlock_folder(&alice.id, &added.entry.id, &pw, UnlockMode::Permanent)
            .await
            .unwrap();
        vault
            .change_password(&alice.id, &pw, &Password::new("new-pw"))
            .await
            .unwrap();
        assert!(vault
            .profiles()
            .verify_password(&alice.id, &Password::new("new-pw"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_open_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        let layout = VaultLayout::new(temp.path().join("data"));

        let first = VaultManager::open(layout.clone()).await.unwrap();
        let (profile, _) = first
            .create_profile("Alice", &Password::new("alice-pw"))
            .await
            .unwrap();
        drop(first);

        let second = VaultManager::open(layout).await.unwrap();
        let found = second.profiles().get_profile(&profile.id).await.unwrap();
        assert_eq!(found.name, "Alice");
        assert!(temp.path().join("data/credentials.store").exists());
    }
}
