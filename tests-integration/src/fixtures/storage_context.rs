//! Storage test context for integration testing
//!
//! Provides both filesystem-backed and in-memory bundle storage for tests.

use anyhow::Result;
use exporter::BundleStore;
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Test context for object storage operations
pub struct StorageTestContext {
    pub object_store: Arc<dyn ObjectStore>,
    storage_mode: StorageMode,
}

enum StorageMode {
    InMemory,
    // Keeps the directory alive for the lifetime of the context
    Filesystem(TempDir),
}

impl StorageTestContext {
    /// Creates in-memory storage for fast tests
    pub async fn new_in_memory() -> Result<Self> {
        let object_store = Arc::new(InMemory::new()) as Arc<dyn ObjectStore>;

        Ok(Self {
            object_store,
            storage_mode: StorageMode::InMemory,
        })
    }

    /// Creates storage rooted in a fresh temporary directory
    pub async fn new_filesystem() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let object_store =
            Arc::new(LocalFileSystem::new_with_prefix(temp_dir.path())?) as Arc<dyn ObjectStore>;

        Ok(Self {
            object_store,
            storage_mode: StorageMode::Filesystem(temp_dir),
        })
    }

    /// Root directory of filesystem-backed storage
    pub fn root(&self) -> Option<&Path> {
        match &self.storage_mode {
            StorageMode::InMemory => None,
            StorageMode::Filesystem(dir) => Some(dir.path()),
        }
    }

    pub fn bundles(&self) -> BundleStore {
        BundleStore::new(self.object_store.clone())
    }

    /// Lists all objects in storage (for verification)
    pub async fn list_all_objects(&self) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .object_store
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        paths.sort();
        Ok(paths)
    }

    /// Gets object count for a specific prefix
    pub async fn count_objects(&self, prefix: &str) -> Result<usize> {
        let prefix_path = object_store::path::Path::from(prefix);
        let metas: Vec<_> = self
            .object_store
            .list(Some(&prefix_path))
            .try_collect()
            .await?;
        Ok(metas.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_in_memory_storage_context() {
        let ctx = StorageTestContext::new_in_memory().await.unwrap();
        assert!(ctx.root().is_none());

        ctx.bundles()
            .write("a/one.csv", Bytes::from_static(b"1"))
            .await
            .unwrap();
        ctx.bundles()
            .write("b/two.csv", Bytes::from_static(b"2"))
            .await
            .unwrap();

        assert_eq!(
            ctx.list_all_objects().await.unwrap(),
            vec!["a/one.csv", "b/two.csv"]
        );
        assert_eq!(ctx.count_objects("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_filesystem_storage_context() {
        let ctx = StorageTestContext::new_filesystem().await.unwrap();

        ctx.bundles()
            .write("dir/file.txt", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let root = ctx.root().unwrap();
        assert!(root.join("dir/file.txt").is_file());
    }
}
