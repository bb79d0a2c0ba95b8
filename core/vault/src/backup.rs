//! Pre-operation folder snapshots.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::VaultLayout;
use crate::registry::BackupRecord;
use crate::saga::{compensation, Compensation};
use phantomvault_common::{Error, FolderId, ProfileId, Result, SagaOperation};
use phantomvault_storage::FolderStore;

/// Creates, discards and prunes folder backups.
#[derive(Clone)]
pub struct BackupManager {
    folders: Arc<dyn FolderStore>,
    layout: VaultLayout,
    retention: usize,
}

impl BackupManager {
    pub fn new(folders: Arc<dyn FolderStore>, layout: VaultLayout, retention: usize) -> Self {
        Self {
            folders,
            layout,
            retention: retention.max(1),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Copy `source` into a new timestamped backup directory.
    ///
    /// # Errors
    /// - Resource error if the copy fails; a partial copy is removed
    pub async fn create(
        &self,
        profile_id: &ProfileId,
        folder_id: &FolderId,
        folder_name: &str,
        source: &Path,
        operation: SagaOperation,
    ) -> Result<BackupRecord> {
        let timestamp = Utc::now();
        let base = self
            .layout
            .backup_path(profile_id, folder_id, timestamp, operation, folder_name);
        let base_dir = snapshot_dir(&base)?.to_path_buf();

        let mut dir = base_dir.clone();
        let mut attempt = 1;
        while self.folders.exists(&dir).await? {
            attempt += 1;
            let mut name = base_dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(format!("-{}", attempt));
            dir = base_dir.with_file_name(name);
        }
        let path = dir.join(folder_name);

        if let Err(e) = self.folders.copy_tree(source, &path).await {
            if self.folders.exists(&dir).await.unwrap_or(false) {
                let _ = self.folders.remove_tree(&dir).await;
            }
            return Err(match e {
                Error::Resource(_) => e,
                other => Error::Resource(format!("Backup failed: {}", other)),
            });
        }

        debug!(folder_id = %folder_id, path = %path.display(), %operation, "Backup created");
        Ok(BackupRecord {
            timestamp,
            path,
            operation: operation.to_string(),
        })
    }

    /// Remove a backup's snapshot directory.
    pub async fn discard(&self, record: &BackupRecord) -> Result<()> {
        let dir = snapshot_dir(&record.path)?;
        if self.folders.exists(dir).await? {
            self.folders.remove_tree(dir).await?;
        }
        Ok(())
    }

    /// Compensation that discards `record`.
    pub fn discard_compensation(&self, record: &BackupRecord) -> Compensation {
        let backups = self.clone();
        let record = record.clone();
        compensation(move || async move { backups.discard(&record).await })
    }

    /// Drop the oldest records beyond the retention limit and return them.
    pub fn prune(&self, backups: &mut Vec<BackupRecord>) -> Vec<BackupRecord> {
        backups.sort_by_key(|b| b.timestamp);
        let excess = backups.len().saturating_sub(self.retention);
        backups.drain(..excess).collect()
    }

    /// Delete the directories of pruned records. Failures are logged only.
    pub async fn remove_pruned(&self, folder_id: &FolderId, pruned: Vec<BackupRecord>) {
        for record in pruned {
            match self.discard(&record).await {
                Ok(()) => info!(folder_id = %folder_id, path = %record.path.display(), "Old backup pruned"),
                Err(e) => warn!(
                    folder_id = %folder_id,
                    path = %record.path.display(),
                    error = %e,
                    "Backup pruning failed"
                ),
            }
        }
    }
}

/// The `<timestamp>-<operation>` directory containing a backup copy.
fn snapshot_dir(path: &Path) -> Result<&Path> {
    path.parent()
        .ok_or_else(|| Error::Validation(format!("Invalid backup path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use phantomvault_storage::LocalFolderStore;
    use proptest::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BackupManager, PathBuf) {
        let temp = TempDir::new().unwrap();
        let layout = VaultLayout::new(temp.path().join("data"));
        let source = temp.path().join("Taxes");
        std::fs::create_dir_all(source.join("sub")).unwrap();
        std::fs::write(source.join("sub/a.txt"), b"alpha").unwrap();
        let manager = BackupManager::new(Arc::new(LocalFolderStore::new()), layout, 3);
        (temp, manager, source)
    }

    #[tokio::test]
    async fn test_create_and_discard() {
        let (_temp, manager, source) = setup();
        let profile = ProfileId::generate();
        let folder = FolderId::generate();

        let record = manager
            .create(&profile, &folder, "Taxes", &source, SagaOperation::Lock)
            .await
            .unwrap();
        assert_eq!(std::fs::read(record.path.join("sub/a.txt")).unwrap(), b"alpha");
        assert_eq!(record.operation, "lock");

        manager.discard(&record).await.unwrap();
        assert!(!record.path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_same_instant_backups_do_not_collide() {
        let (_temp, manager, source) = setup();
        let profile = ProfileId::generate();
        let folder = FolderId::generate();

        let a = manager
            .create(&profile, &folder, "Taxes", &source, SagaOperation::Lock)
            .await
            .unwrap();
        let b = manager
            .create(&profile, &folder, "Taxes", &source, SagaOperation::Lock)
            .await
            .unwrap();
        assert_ne!(a.path, b.path);
    }

    #[tokio::test]
    async fn test_missing_source_is_resource_error() {
        let (temp, manager, _) = setup();
        let result = manager
            .create(
                &ProfileId::generate(),
                &FolderId::generate(),
                "Gone",
                &temp.path().join("gone"),
                SagaOperation::Unlock,
            )
            .await;
        assert!(matches!(result, Err(Error::Resource(_))));
    }

    #[test]
    fn test_prune_keeps_newest() {
        let (_temp, manager, _) = setup();
        let now = Utc::now();
        let mut backups: Vec<BackupRecord> = (0..4)
            .map(|i| BackupRecord {
                timestamp: now + Duration::seconds(i),
                path: PathBuf::from(format!("/b/{}/Taxes", i)),
                operation: "lock".to_string(),
            })
            .rev()
            .collect();

        let pruned = manager.prune(&mut backups);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].path, PathBuf::from("/b/0/Taxes"));
        assert_eq!(backups.len(), 3);
        assert_eq!(backups[0].path, PathBuf::from("/b/1/Taxes"));
    }

    proptest! {
        #[test]
        fn prop_prune_keeps_newest_within_retention(count in 0usize..12, retention in 1usize..6) {
            let manager = BackupManager::new(
                Arc::new(LocalFolderStore::new()),
                VaultLayout::new("/data"),
                retention,
            );
            let now = Utc::now();
            let mut backups: Vec<BackupRecord> = (0..count)
                .map(|i| BackupRecord {
                    timestamp: now + Duration::seconds(i as i64),
                    path: PathBuf::from(format!("/b/{}/F", i)),
                    operation: "unlock".to_string(),
                })
                .collect();

            let pruned = manager.prune(&mut backups);

            prop_assert_eq!(backups.len(), count.min(retention));
            prop_assert_eq!(pruned.len() + backups.len(), count);
            if let (Some(newest_pruned), Some(oldest_kept)) = (pruned.last(), backups.first()) {
                prop_assert!(newest_pruned.timestamp < oldest_kept.timestamp);
            }
        }
    }
}
