//! In-memory document store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::provider::DocumentStore;
use phantomvault_common::{Error, Result};

/// In-memory document store.
///
/// Useful for testing. All data is stored in memory and lost on drop.
/// Clones share the same backing map.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    storage: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryDocumentStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a document's raw bytes without going through `write`.
    pub fn overwrite_raw(&self, path: &Path, data: Vec<u8>) -> Result<()> {
        self.storage
            .write()
            .map_err(|_| Error::Resource("Memory store lock poisoned".to_string()))?
            .insert(path.to_path_buf(), data);
        Ok(())
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let storage = self
            .storage
            .read()
            .map_err(|_| Error::Resource("Memory store lock poisoned".to_string()))?;
        storage
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Document not found: {}", path.display())))
    }

    async fn write(&self, path: &Path, data: Vec<u8>) -> Result<()> {
        self.overwrite_raw(path, data)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let storage = self
            .storage
            .read()
            .map_err(|_| Error::Resource("Memory store lock poisoned".to_string()))?;
        Ok(storage.contains_key(path))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| Error::Resource("Memory store lock poisoned".to_string()))?;
        storage
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Document not found: {}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read() {
        let store = MemoryDocumentStore::new();
        let path = Path::new("/data/credentials.store");

        store.write(path, b"Hello, World!".to_vec()).await.unwrap();
        assert_eq!(store.read(path).await.unwrap(), b"Hello, World!");
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let store = MemoryDocumentStore::new();
        let path = Path::new("/data/doc");

        assert!(!store.exists(path).await.unwrap());
        store.write(path, vec![1, 2, 3]).await.unwrap();
        assert!(store.exists(path).await.unwrap());

        store.delete(path).await.unwrap();
        assert!(!store.exists(path).await.unwrap());
        assert!(matches!(store.delete(path).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let store = MemoryDocumentStore::new();
        let clone = store.clone();

        store.write(Path::new("/a"), vec![1]).await.unwrap();
        assert_eq!(clone.read(Path::new("/a")).await.unwrap(), vec![1]);
        assert_eq!(clone.len(), 1);
    }
}
