//! Folder visibility concealment.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use phantomvault_common::{Error, Result};

/// Hides and reveals folders on the local filesystem.
#[async_trait]
pub trait FolderHider: Send + Sync {
    /// Conceal the folder and return its new path.
    async fn hide_folder(&self, path: &Path) -> Result<PathBuf>;

    /// Reveal the folder and return its new path.
    async fn unhide_folder(&self, path: &Path) -> Result<PathBuf>;

    /// True if `path` is in its concealed form.
    fn is_hidden(&self, path: &Path) -> bool;
}

/// Hides folders by prefixing their name with a dot.
#[derive(Debug, Clone, Default)]
pub struct DotPrefixHider;

impl DotPrefixHider {
    pub fn new() -> Self {
        Self
    }

    async fn rename(from: &Path, to: PathBuf) -> Result<PathBuf> {
        if !fs::try_exists(from).await? {
            return Err(Error::NotFound(format!("Folder not found: {}", from.display())));
        }
        if fs::try_exists(&to).await? {
            return Err(Error::AlreadyExists(format!(
                "Path already exists: {}",
                to.display()
            )));
        }
        fs::rename(from, &to).await?;
        debug!(from = %from.display(), to = %to.display(), "Folder visibility changed");
        Ok(to)
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Validation(format!("Invalid folder path: {}", path.display())))
}

#[async_trait]
impl FolderHider for DotPrefixHider {
    async fn hide_folder(&self, path: &Path) -> Result<PathBuf> {
        let name = file_name(path)?;
        if name.starts_with('.') {
            return Ok(path.to_path_buf());
        }
        Self::rename(path, path.with_file_name(format!(".{}", name))).await
    }

    async fn unhide_folder(&self, path: &Path) -> Result<PathBuf> {
        let name = file_name(path)?;
        let visible = name.trim_start_matches('.');
        if visible == name {
            return Ok(path.to_path_buf());
        }
        if visible.is_empty() {
            return Err(Error::Validation(format!(
                "Invalid folder path: {}",
                path.display()
            )));
        }
        Self::rename(path, path.with_file_name(visible)).await
    }

    fn is_hidden(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_hide_and_unhide() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("Private");
        std::fs::create_dir(&folder).unwrap();
        let hider = DotPrefixHider::new();

        let hidden = hider.hide_folder(&folder).await.unwrap();
        assert_eq!(hidden, temp.path().join(".Private"));
        assert!(hider.is_hidden(&hidden));
        assert!(!folder.exists());

        let shown = hider.unhide_folder(&hidden).await.unwrap();
        assert_eq!(shown, folder);
        assert!(folder.exists());
    }

    #[tokio::test]
    async fn test_hide_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join(".already");
        std::fs::create_dir(&folder).unwrap();

        let hidden = DotPrefixHider::new().hide_folder(&folder).await.unwrap();
        assert_eq!(hidden, folder);
    }

    #[tokio::test]
    async fn test_hide_refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("X")).unwrap();
        std::fs::create_dir(temp.path().join(".X")).unwrap();

        assert!(matches!(
            DotPrefixHider::new().hide_folder(&temp.path().join("X")).await,
            Err(Error::AlreadyExists(_))
        ));
    }
}
