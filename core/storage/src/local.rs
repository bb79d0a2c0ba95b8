//! Local filesystem storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

use crate::provider::{DocumentStore, FolderStore};
use phantomvault_common::{Error, Result};

/// Local filesystem document store.
///
/// Writes go to a sibling temp file which is synced and then renamed over
/// the target.
#[derive(Debug, Clone, Default)]
pub struct LocalDocumentStore;

impl LocalDocumentStore {
    pub fn new() -> Self {
        Self
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "Document not found: {}",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &Path, data: Vec<u8>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = Self::temp_path(path);
        let mut file = fs::File::create(&temp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp, path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "Document not found: {}",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Local filesystem folder-tree operations.
#[derive(Debug, Clone, Default)]
pub struct LocalFolderStore;

impl LocalFolderStore {
    pub fn new() -> Self {
        Self
    }
}

fn resource(action: &str, path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Resource(format!("{} {}: {}", action, path.display(), e))
}

fn copy_tree_blocking(from: &Path, to: &Path) -> Result<u64> {
    let mut files = 0u64;
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|e| resource("walk", from, e))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| resource("walk", entry.path(), e))?;
        let target = to.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| resource("create", &target, e))?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target).map_err(|e| resource("copy", entry.path(), e))?;
            files += 1;
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file during copy");
        }
    }
    Ok(files)
}

#[async_trait]
impl FolderStore for LocalFolderStore {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn copy_tree(&self, from: &Path, to: &Path) -> Result<u64> {
        if !fs::try_exists(from).await? {
            return Err(Error::NotFound(format!("Source not found: {}", from.display())));
        }
        if !fs::metadata(from).await?.is_dir() {
            return Err(Error::Validation(format!(
                "Not a directory: {}",
                from.display()
            )));
        }
        if fs::try_exists(to).await? {
            return Err(Error::AlreadyExists(format!(
                "Destination already exists: {}",
                to.display()
            )));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| resource("create", parent, e))?;
        }

        let (from_owned, to_owned) = (from.to_path_buf(), to.to_path_buf());
        let files = tokio::task::spawn_blocking(move || copy_tree_blocking(&from_owned, &to_owned))
            .await
            .map_err(|e| Error::Resource(format!("Copy task failed: {}", e)))??;

        debug!(from = %from.display(), to = %to.display(), files, "Copied folder tree");
        Ok(files)
    }

    async fn move_tree(&self, from: &Path, to: &Path) -> Result<()> {
        if !fs::try_exists(from).await? {
            return Err(Error::NotFound(format!("Source not found: {}", from.display())));
        }
        if fs::try_exists(to).await? {
            return Err(Error::AlreadyExists(format!(
                "Destination already exists: {}",
                to.display()
            )));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| resource("create", parent, e))?;
        }

        fs::rename(from, to)
            .await
            .map_err(|e| resource("move", from, e))?;
        debug!(from = %from.display(), to = %to.display(), "Moved folder tree");
        Ok(())
    }

    async fn remove_tree(&self, path: &Path) -> Result<()> {
        if !fs::try_exists(path).await? {
            return Err(Error::NotFound(format!("Path not found: {}", path.display())));
        }
        fs::remove_dir_all(path)
            .await
            .map_err(|e| resource("remove", path, e))?;
        Ok(())
    }
}
