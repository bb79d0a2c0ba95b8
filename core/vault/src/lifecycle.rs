//! Folder lifecycle engine: the lock/unlock state machine.
//!
//! Every transition runs as a saga:
//! - lock: backup, encrypt in place, move into the vault, persist
//! - unlock: backup, move out of the vault, decrypt in place, persist
//!
//! A failed step unwinds the completed ones in reverse order. Operations on
//! the same folder id are serialized by a per-folder async mutex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backup::BackupManager;
use crate::cipher::FolderCipher;
use crate::config::{VaultLayout, VaultSettings};
use crate::hider::FolderHider;
use crate::profile::{secret_to_string, validate_password, IssuedSecrets, ProfileManager};
use crate::registry::{BackupRecord, FolderEntry, FolderRegistryStore, UnlockMode};
use crate::saga::{compensation, Compensation, Saga};
use crate::session::PasswordCache;
use phantomvault_common::{Error, FolderId, Password, ProfileId, Result, SagaOperation};
use phantomvault_crypto::{unwrap_secret, KdfParams, RecoveryKey};
use phantomvault_storage::FolderStore;

/// Receives notifications about temporary unlocks.
///
/// Implemented by the auto-lock coordinator.
pub trait UnlockObserver: Send + Sync {
    /// A folder was unlocked temporarily and should be relocked later.
    fn register_unlock(&self, profile_id: &ProfileId, folder_id: &FolderId);

    /// A folder no longer needs relocking.
    fn unregister_unlock(&self, folder_id: &FolderId);
}

/// Locks a tracked folder on behalf of the auto-lock coordinator.
#[async_trait]
pub trait FolderLocker: Send + Sync {
    async fn lock_tracked(&self, folder_id: &FolderId) -> Result<()>;
}

/// In-memory record of a temporarily unlocked folder. Never persisted.
#[derive(Debug, Clone)]
pub struct TrackedUnlock {
    pub folder_id: FolderId,
    pub profile_id: ProfileId,
    pub mode: UnlockMode,
    pub unlocked_at: DateTime<Utc>,
    pub folder_path: PathBuf,
    relock_secret: Password,
}

/// Outcome of unlocking every master-password folder of a profile.
#[derive(Debug, Default)]
pub struct UnlockAllReport {
    pub succeeded: Vec<FolderId>,
    pub failed: Vec<(FolderId, String)>,
}

/// A newly added folder and, for custom-password folders, its recovery key.
#[derive(Debug)]
pub struct AddedFolder {
    pub entry: FolderEntry,
    pub recovery_key: Option<RecoveryKey>,
}

/// Collaborators the engine is built from.
pub struct EngineParts {
    pub registry: Arc<FolderRegistryStore>,
    pub profiles: Arc<ProfileManager>,
    pub cipher: Arc<dyn FolderCipher>,
    pub hider: Arc<dyn FolderHider>,
    pub folders: Arc<dyn FolderStore>,
    pub cache: Arc<PasswordCache>,
    pub layout: VaultLayout,
    pub settings: VaultSettings,
}

/// Drives folders between the unlocked and locked states.
pub struct FolderLifecycleEngine {
    registry: Arc<FolderRegistryStore>,
    profiles: Arc<ProfileManager>,
    cipher: Arc<dyn FolderCipher>,
    hider: Arc<dyn FolderHider>,
    folders: Arc<dyn FolderStore>,
    cache: Arc<PasswordCache>,
    backups: BackupManager,
    layout: VaultLayout,
    params: KdfParams,
    unlocked: StdMutex<HashMap<FolderId, TrackedUnlock>>,
    folder_locks: StdMutex<HashMap<FolderId, Arc<Mutex<()>>>>,
    observer: RwLock<Option<Weak<dyn UnlockObserver>>>,
}

impl FolderLifecycleEngine {
    pub fn new(parts: EngineParts) -> Self {
        let backups = BackupManager::new(
            parts.folders.clone(),
            parts.layout.clone(),
            parts.settings.backup_retention,
        );
        Self {
            registry: parts.registry,
            profiles: parts.profiles,
            cipher: parts.cipher,
            hider: parts.hider,
            folders: parts.folders,
            cache: parts.cache,
            backups,
            layout: parts.layout,
            params: parts.settings.kdf_params(),
            unlocked: StdMutex::new(HashMap::new()),
            folder_locks: StdMutex::new(HashMap::new()),
            observer: RwLock::new(None),
        }
    }

    /// Attach the observer notified on temporary unlock and lock.
    pub fn set_observer(&self, observer: Weak<dyn UnlockObserver>) {
        if let Ok(mut slot) = self.observer.write() {
            *slot = Some(observer);
        }
    }

    fn observer(&self) -> Option<Arc<dyn UnlockObserver>> {
        self.observer
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade))
    }

    fn folder_lock(&self, folder_id: &FolderId) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .folder_locks
            .lock()
            .map_err(|_| Error::Resource("Folder lock map poisoned".to_string()))?;
        Ok(locks
            .entry(folder_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    fn track(&self, tracked: TrackedUnlock) {
        let (profile_id, folder_id) = (tracked.profile_id.clone(), tracked.folder_id.clone());
        if let Ok(mut unlocked) = self.unlocked.lock() {
            unlocked.insert(folder_id.clone(), tracked);
        }
        if let Some(observer) = self.observer() {
            observer.register_unlock(&profile_id, &folder_id);
        }
    }

    fn untrack(&self, folder_id: &FolderId) {
        let removed = self
            .unlocked
            .lock()
            .ok()
            .and_then(|mut unlocked| unlocked.remove(folder_id));
        if removed.is_some() {
            debug!(folder_id = %folder_id, "Temporary unlock no longer tracked");
        }
        if let Some(observer) = self.observer() {
            observer.unregister_unlock(folder_id);
        }
    }

    fn tracked(&self, folder_id: &FolderId) -> Option<TrackedUnlock> {
        self.unlocked
            .lock()
            .ok()
            .and_then(|unlocked| unlocked.get(folder_id).cloned())
    }

    /// Every folder currently tracked as temporarily unlocked.
    pub fn tracked_unlocks(&self) -> Vec<TrackedUnlock> {
        self.unlocked
            .lock()
            .map(|unlocked| unlocked.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Stop tracking every temporary unlock of a profile.
    pub fn forget_profile(&self, profile_id: &ProfileId) {
        let ids: Vec<FolderId> = self
            .tracked_unlocks()
            .into_iter()
            .filter(|t| &t.profile_id == profile_id)
            .map(|t| t.folder_id)
            .collect();
        for id in ids {
            self.untrack(&id);
        }
    }

    async fn verify_folder_password(
        &self,
        profile_id: &ProfileId,
        entry: &FolderEntry,
        password: &Password,
    ) -> Result<bool> {
        if entry.uses_master_password {
            return self.profiles.verify_password(profile_id, password).await;
        }
        match &entry.custom_password_hash {
            Some(hash) => Ok(hash.verify(password.as_bytes())),
            None => Err(Error::Integrity(format!(
                "Folder {} has no password hash",
                entry.id
            ))),
        }
    }

    fn remember_password(&self, profile_id: &ProfileId, entry: &FolderEntry, password: &Password) {
        if entry.uses_master_password {
            self.cache.store(profile_id, password);
        }
    }

    fn decrypt_compensation(&self, path: &Path, password: &Password) -> Compensation {
        let (cipher, path, password) = (self.cipher.clone(), path.to_path_buf(), password.clone());
        compensation(move || async move { cipher.decrypt_folder(&path, &password).await })
    }

    fn encrypt_compensation(&self, path: &Path, password: &Password) -> Compensation {
        let (cipher, path, password) = (self.cipher.clone(), path.to_path_buf(), password.clone());
        compensation(move || async move { cipher.encrypt_folder(&path, &password).await })
    }

    fn move_compensation(&self, from: &Path, to: &Path) -> Compensation {
        let (folders, from, to) = (self.folders.clone(), from.to_path_buf(), to.to_path_buf());
        compensation(move || async move { folders.move_tree(&from, &to).await })
    }

    /// Start managing a folder.
    ///
    /// # Preconditions
    /// - `path` is an existing directory outside the data root
    /// - `path` is not already managed by this profile
    ///
    /// # Postconditions
    /// - The entry is unlocked with no vault path
    /// - A custom password gets its own hash and recovery key
    ///
    /// # Errors
    /// - Validation error on missing, duplicate or invalid paths
    /// - Not found if the profile does not exist
    pub async fn add_folder(
        &self,
        profile_id: &ProfileId,
        path: &Path,
        custom_password: Option<&Password>,
    ) -> Result<AddedFolder> {
        self.profiles.get_profile(profile_id).await?;

        if !self.folders.exists(path).await? {
            return Err(Error::Validation(format!(
                "Folder does not exist: {}",
                path.display()
            )));
        }
        let path = tokio::fs::canonicalize(path).await?;
        if !tokio::fs::metadata(&path).await?.is_dir() {
            return Err(Error::Validation(format!("Not a directory: {}", path.display())));
        }
        if self.layout.contains(&path) {
            return Err(Error::Validation(
                "Folder lies inside the vault data directory".to_string(),
            ));
        }
        let folder_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Validation(format!("Invalid folder name: {}", path.display())))?;

        let secrets = match custom_password {
            Some(password) => {
                validate_password(password)?;
                Some(IssuedSecrets::issue(password, &self.params)?)
            }
            None => None,
        };

        let mut entry = FolderEntry {
            id: FolderId::generate(),
            folder_name,
            original_path: Some(path.clone()),
            vault_path: None,
            is_locked: false,
            unlock_mode: None,
            uses_master_password: secrets.is_none(),
            custom_password_hash: None,
            custom_recovery_key_hash: None,
            encrypted_custom_recovery_key: None,
            custom_password_encrypted_with_recovery: None,
            backups: Vec::new(),
            last_unlocked: None,
        };
        let recovery_key = secrets.map(|s| {
            entry.custom_password_hash = Some(s.password_hash);
            entry.custom_recovery_key_hash = Some(s.recovery_key_hash);
            entry.encrypted_custom_recovery_key = Some(s.recovery_under_password);
            entry.custom_password_encrypted_with_recovery = Some(s.password_under_recovery);
            s.recovery_key
        });

        let stored = entry.clone();
        self.registry
            .update(profile_id, move |registry| {
                let duplicate = registry
                    .folders
                    .iter()
                    .any(|f| f.original_path.as_deref() == stored.original_path.as_deref());
                if duplicate {
                    return Err(Error::Validation(format!(
                        "Folder is already managed: {}",
                        path.display()
                    )));
                }
                registry.folders.push(stored);
                Ok(())
            })
            .await?;

        info!(profile_id = %profile_id, folder_id = %entry.id, custom = recovery_key.is_some(), "Folder added");
        Ok(AddedFolder {
            entry,
            recovery_key,
        })
    }

    pub async fn list_folders(&self, profile_id: &ProfileId) -> Result<Vec<FolderEntry>> {
        Ok(self.registry.load(profile_id).await?.folders)
    }

    pub async fn get_folder(&self, profile_id: &ProfileId, folder_id: &FolderId) -> Result<FolderEntry> {
        self.registry.get(profile_id, folder_id).await
    }

    pub async fn has_locked_folders(&self, profile_id: &ProfileId) -> Result<bool> {
        Ok(self.registry.load(profile_id).await?.has_locked_folders())
    }

    /// Lock a folder with an explicit password.
    ///
    /// No-op if the folder is already locked.
    ///
    /// # Errors
    /// - Not found if the folder is not managed
    /// - Authentication error if the password does not match
    /// - Resource error if the backup cannot be taken (nothing changed)
    /// - Saga error if a later step failed; see its compensation outcome
    pub async fn lock_folder_with_password(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        password: &Password,
    ) -> Result<FolderEntry> {
        let lock = self.folder_lock(folder_id)?;
        let _guard = lock.lock().await;
        self.lock_exclusive(profile_id, folder_id, password).await
    }

    async fn lock_exclusive(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        password: &Password,
    ) -> Result<FolderEntry> {
        let entry = self.registry.get(profile_id, folder_id).await?;
        if entry.is_locked {
            debug!(folder_id = %folder_id, "Folder already locked");
            return Ok(entry);
        }
        if !self.verify_folder_password(profile_id, &entry, password).await? {
            warn!(folder_id = %folder_id, "Lock refused: wrong password");
            return Err(Error::Authentication("Invalid password for folder".to_string()));
        }

        let original = entry
            .original_path
            .clone()
            .ok_or_else(|| Error::Validation(format!("Folder {} has no original path", folder_id)))?;
        if !self.folders.exists(&original).await? {
            return Err(Error::NotFound(format!(
                "Folder missing at {}",
                original.display()
            )));
        }
        let vault_path = self.layout.vault_path(profile_id, folder_id, &entry.folder_name);

        let mut saga = Saga::new(SagaOperation::Lock, folder_id);
        let backup = saga
            .run(
                "backup",
                self.backups.create(profile_id, folder_id, &entry.folder_name, &original, SagaOperation::Lock),
                |record| Some(self.backups.discard_compensation(record)),
            )
            .await?;
        saga.run(
            "encrypt",
            self.cipher.encrypt_folder(&original, password),
            |_| Some(self.decrypt_compensation(&original, password)),
        )
        .await?;
        saga.run(
            "move",
            self.folders.move_tree(&original, &vault_path),
            |_| Some(self.move_compensation(&vault_path, &original)),
        )
        .await?;
        let (updated, pruned) = saga
            .run(
                "persist",
                self.persist_lock(profile_id, folder_id, &vault_path, backup),
                |_| None,
            )
            .await?;

        self.untrack(folder_id);
        self.remember_password(profile_id, &entry, password);
        self.backups.remove_pruned(folder_id, pruned).await;

        info!(profile_id = %profile_id, folder_id = %folder_id, "Folder locked");
        Ok(updated)
    }

    async fn persist_lock(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        vault_path: &Path,
        backup: BackupRecord,
    ) -> Result<(FolderEntry, Vec<BackupRecord>)> {
        self.registry
            .update(profile_id, |registry| {
                let entry = registry.require_mut(folder_id)?;
                entry.is_locked = true;
                entry.vault_path = Some(vault_path.to_path_buf());
                entry.unlock_mode = None;
                entry.backups.push(backup);
                let pruned = self.backups.prune(&mut entry.backups);
                Ok((entry.clone(), pruned))
            })
            .await
    }

    /// Lock a master-password folder using the cached master password.
    ///
    /// # Errors
    /// - Validation error for custom-password folders
    /// - Authentication error if no password is cached
    pub async fn lock_folder(&self, profile_id: &ProfileId, folder_id: &FolderId) -> Result<FolderEntry> {
        let entry = self.registry.get(profile_id, folder_id).await?;
        if entry.is_locked {
            return Ok(entry);
        }
        if !entry.uses_master_password {
            return Err(Error::Validation(
                "Folder uses a custom password; supply it explicitly".to_string(),
            ));
        }
        let password = self
            .cache
            .get(profile_id)
            .ok_or_else(|| Error::Authentication("No cached master password".to_string()))?;
        self.lock_folder_with_password(profile_id, folder_id, &password).await
    }

    /// Unlock a folder.
    ///
    /// Returns `Ok(false)` without changing anything if the password does
    /// not match or the entry is a legacy entry lacking its paths.
    /// No-op returning `Ok(true)` if the folder is already unlocked.
    ///
    /// # Postconditions
    /// - Temporary: the folder is tracked for auto-lock
    /// - Permanent: the entry is deleted from the registry
    ///
    /// # Errors
    /// - Not found if the folder is not managed
    /// - Resource error if the backup cannot be taken (nothing changed)
    /// - Saga error if a later step failed; see its compensation outcome
    pub async fn unlock_folder(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        password: &Password,
        mode: UnlockMode,
    ) -> Result<bool> {
        let lock = self.folder_lock(folder_id)?;
        let _guard = lock.lock().await;
        self.unlock_exclusive(profile_id, folder_id, password, mode).await
    }

    async fn unlock_exclusive(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        password: &Password,
        mode: UnlockMode,
    ) -> Result<bool> {
        let entry = self.registry.get(profile_id, folder_id).await?;
        if !entry.is_locked {
            debug!(folder_id = %folder_id, "Folder already unlocked");
            return Ok(true);
        }
        if !self.verify_folder_password(profile_id, &entry, password).await? {
            warn!(folder_id = %folder_id, "Unlock refused: wrong password");
            return Ok(false);
        }
        let (vault_path, original) = match (entry.vault_path.clone(), entry.original_path.clone()) {
            (Some(vault_path), Some(original)) => (vault_path, original),
            _ => {
                warn!(folder_id = %folder_id, "Unlock refused: legacy entry without paths");
                return Ok(false);
            }
        };

        let mut saga = Saga::new(SagaOperation::Unlock, folder_id);
        let backup = saga
            .run(
                "backup",
                self.backups.create(profile_id, folder_id, &entry.folder_name, &vault_path, SagaOperation::Unlock),
                |record| Some(self.backups.discard_compensation(record)),
            )
            .await?;
        saga.run(
            "move",
            self.folders.move_tree(&vault_path, &original),
            |_| Some(self.move_compensation(&original, &vault_path)),
        )
        .await?;
        saga.run(
            "decrypt",
            self.cipher.decrypt_folder(&original, password),
            |_| Some(self.encrypt_compensation(&original, password)),
        )
        .await?;
        let pruned = saga
            .run(
                "persist",
                self.persist_unlock(profile_id, folder_id, mode, backup),
                |_| None,
            )
            .await?;

        match mode {
            UnlockMode::Temporary => self.track(TrackedUnlock {
                folder_id: folder_id.clone(),
                profile_id: profile_id.clone(),
                mode,
                unlocked_at: Utc::now(),
                folder_path: original,
                relock_secret: password.clone(),
            }),
            UnlockMode::Permanent => self.untrack(folder_id),
        }
        self.remember_password(profile_id, &entry, password);
        self.backups.remove_pruned(folder_id, pruned).await;

        info!(profile_id = %profile_id, folder_id = %folder_id, %mode, "Folder unlocked");
        Ok(true)
    }

    async fn persist_unlock(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        mode: UnlockMode,
        backup: BackupRecord,
    ) -> Result<Vec<BackupRecord>> {
        self.registry
            .update(profile_id, |registry| match mode {
                UnlockMode::Permanent => {
                    // The folder leaves vault management with all its backups.
                    let mut removed = registry.remove(folder_id)?;
                    removed.backups.push(backup);
                    Ok(removed.backups)
                }
                UnlockMode::Temporary => {
                    let entry = registry.require_mut(folder_id)?;
                    entry.is_locked = false;
                    entry.vault_path = None;
                    entry.unlock_mode = Some(mode);
                    entry.last_unlocked = Some(Utc::now());
                    entry.backups.push(backup);
                    Ok(self.backups.prune(&mut entry.backups))
                }
            })
            .await
    }

    /// Unlock every locked master-password folder of a profile.
    ///
    /// One folder's failure does not stop the batch.
    pub async fn unlock_all_folders(
        &self,
        profile_id: &ProfileId,
        password: &Password,
        mode: UnlockMode,
    ) -> Result<UnlockAllReport> {
        let targets: Vec<FolderId> = self
            .registry
            .load(profile_id)
            .await?
            .folders
            .into_iter()
            .filter(|f| f.uses_master_password && f.is_locked)
            .map(|f| f.id)
            .collect();

        let mut report = UnlockAllReport::default();
        for folder_id in targets {
            match self.unlock_folder(profile_id, &folder_id, password, mode).await {
                Ok(true) => report.succeeded.push(folder_id),
                Ok(false) => report.failed.push((folder_id, "authentication failed".to_string())),
                Err(e) => {
                    warn!(folder_id = %folder_id, error = %e, "Unlock failed during batch");
                    report.failed.push((folder_id, e.to_string()));
                }
            }
        }
        info!(
            profile_id = %profile_id,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Batch unlock finished"
        );
        Ok(report)
    }

    /// Stop managing a folder.
    ///
    /// # Errors
    /// - Validation error while the folder is locked
    pub async fn remove_folder(&self, profile_id: &ProfileId, folder_id: &FolderId) -> Result<FolderEntry> {
        let lock = self.folder_lock(folder_id)?;
        let _guard = lock.lock().await;

        let removed = self
            .registry
            .update(profile_id, |registry| {
                if registry.require(folder_id)?.is_locked {
                    return Err(Error::Validation(
                        "Folder is locked; unlock it before removing".to_string(),
                    ));
                }
                registry.remove(folder_id)
            })
            .await?;

        self.untrack(folder_id);
        self.backups.remove_pruned(folder_id, removed.backups.clone()).await;
        info!(profile_id = %profile_id, folder_id = %folder_id, "Folder removed");
        Ok(removed)
    }

    /// Recover the custom password of a folder from its recovery key.
    ///
    /// # Errors
    /// - Validation error for master-password folders or malformed keys
    /// - Authentication error if the key does not match
    pub async fn recover_folder_password(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        recovery_key: &str,
    ) -> Result<Password> {
        let entry = self.registry.get(profile_id, folder_id).await?;
        if entry.uses_master_password {
            return Err(Error::Validation(
                "Folder uses the master password".to_string(),
            ));
        }
        let key = RecoveryKey::parse(recovery_key)?;
        let (hash, wrapped) = match (
            &entry.custom_recovery_key_hash,
            &entry.custom_password_encrypted_with_recovery,
        ) {
            (Some(hash), Some(wrapped)) => (hash, wrapped),
            _ => {
                return Err(Error::Integrity(format!(
                    "Folder {} has no recovery data",
                    folder_id
                )))
            }
        };
        if !hash.verify(key.as_bytes()) {
            return Err(Error::Authentication("Recovery key does not match".to_string()));
        }
        let plain = unwrap_secret(wrapped, key.as_bytes())?;
        Ok(Password::new(secret_to_string(plain)?))
    }

    /// Conceal an unlocked folder in place and record its new path.
    pub async fn hide_folder(&self, profile_id: &ProfileId, folder_id: &FolderId) -> Result<FolderEntry> {
        self.change_visibility(profile_id, folder_id, true).await
    }

    /// Reveal a concealed folder and record its new path.
    pub async fn unhide_folder(&self, profile_id: &ProfileId, folder_id: &FolderId) -> Result<FolderEntry> {
        self.change_visibility(profile_id, folder_id, false).await
    }

    async fn change_visibility(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        hide: bool,
    ) -> Result<FolderEntry> {
        let lock = self.folder_lock(folder_id)?;
        let _guard = lock.lock().await;

        let entry = self.registry.get(profile_id, folder_id).await?;
        if entry.is_locked {
            return Err(Error::Validation(
                "Locked folders live in the vault; unlock first".to_string(),
            ));
        }
        let current = entry
            .original_path
            .clone()
            .ok_or_else(|| Error::Validation(format!("Folder {} has no original path", folder_id)))?;

        let moved = if hide {
            self.hider.hide_folder(&current).await?
        } else {
            self.hider.unhide_folder(&current).await?
        };
        if moved == current {
            return Ok(entry);
        }

        let recorded = moved.clone();
        let result = self
            .registry
            .update(profile_id, move |registry| {
                let entry = registry.require_mut(folder_id)?;
                entry.original_path = Some(recorded);
                Ok(entry.clone())
            })
            .await;

        match result {
            Ok(updated) => {
                if let Some(mut tracked) = self.tracked(folder_id) {
                    tracked.folder_path = moved;
                    if let Ok(mut unlocked) = self.unlocked.lock() {
                        unlocked.insert(folder_id.clone(), tracked);
                    }
                }
                info!(folder_id = %folder_id, hidden = hide, "Folder visibility changed");
                Ok(updated)
            }
            Err(e) => {
                let reverted = if hide {
                    self.hider.unhide_folder(&moved).await
                } else {
                    self.hider.hide_folder(&moved).await
                };
                if let Err(revert) = reverted {
                    warn!(folder_id = %folder_id, error = %revert, "Could not revert visibility change");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl FolderLocker for FolderLifecycleEngine {
    async fn lock_tracked(&self, folder_id: &FolderId) -> Result<()> {
        let tracked = self
            .tracked(folder_id)
            .ok_or_else(|| Error::NotFound(format!("Folder {} is not tracked", folder_id)))?;
        self.lock_folder_with_password(&tracked.profile_id, folder_id, &tracked.relock_secret)
            .await
            .map(|_| ())
    }
}
