//! Storage trait definitions.

use async_trait::async_trait;
use std::path::Path;

use phantomvault_common::Result;

/// Store for whole-file metadata documents.
///
/// Documents are addressed by path. Every write replaces the previous
/// content completely.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the store name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Read a document.
    ///
    /// # Errors
    /// - Document not found
    /// - I/O errors
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write a document.
    ///
    /// # Postconditions
    /// - Parent directories are created if needed
    /// - Readers observe either the old or the new content, never a mix
    ///
    /// # Errors
    /// - I/O errors
    async fn write(&self, path: &Path, data: Vec<u8>) -> Result<()>;

    /// Check if a document exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Delete a document.
    ///
    /// # Errors
    /// - Document not found
    async fn delete(&self, path: &Path) -> Result<()>;
}

/// Operations on whole folder trees.
///
/// Used for backups and for moving folders into and out of the vault.
#[async_trait]
pub trait FolderStore: Send + Sync {
    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Recursively copy the tree at `from` to `to`.
    ///
    /// # Preconditions
    /// - `from` is a directory
    /// - `to` does not exist
    ///
    /// # Postconditions
    /// - Parent directories of `to` are created if needed
    /// - Returns the number of regular files copied
    ///
    /// # Errors
    /// - Source not found or destination already exists
    /// - Resource errors during the copy
    async fn copy_tree(&self, from: &Path, to: &Path) -> Result<u64>;

    /// Move the tree at `from` to `to`.
    ///
    /// Same-volume rename; cross-device moves are not attempted.
    ///
    /// # Errors
    /// - Source not found or destination already exists
    /// - Resource errors during the rename
    async fn move_tree(&self, from: &Path, to: &Path) -> Result<()>;

    /// Recursively remove the tree at `path`.
    ///
    /// # Errors
    /// - Path not found
    /// - Resource errors during removal
    async fn remove_tree(&self, path: &Path) -> Result<()>;
}
