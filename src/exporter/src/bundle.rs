//! Export bundle storage and layout.

use std::sync::Arc;

use bytes::Bytes;
use common::model::Hold;
use futures::TryStreamExt;
use object_store::{ObjectStore, PutPayload, path::Path};

/// Thin adapter over the object store holding export bundles.
#[derive(Debug, Clone)]
pub struct BundleStore {
    store: Arc<dyn ObjectStore>,
}

impl BundleStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub async fn exists(&self, path: &str) -> object_store::Result<bool> {
        match self.store.head(&Path::from(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn read(&self, path: &str) -> object_store::Result<Bytes> {
        self.store.get(&Path::from(path)).await?.bytes().await
    }

    /// Write `data` at `path` in a single put, replacing any existing object.
    pub async fn write(&self, path: &str, data: Bytes) -> object_store::Result<()> {
        self.store
            .put(&Path::from(path), PutPayload::from_bytes(data))
            .await?;
        Ok(())
    }

    pub async fn copy(&self, from: &str, to: &str) -> object_store::Result<()> {
        self.store.copy(&Path::from(from), &Path::from(to)).await
    }

    /// All object paths under `prefix`, sorted.
    pub async fn list(&self, prefix: &str) -> object_store::Result<Vec<String>> {
        let prefix = Path::from(prefix);
        let mut paths: Vec<String> = self
            .store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        paths.sort();
        Ok(paths)
    }
}

/// Paths of the objects making up one hold's bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    base: String,
}

impl BundleLayout {
    pub fn for_hold(hold: &Hold) -> Self {
        Self {
            base: hold.base_path(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn index(&self) -> String {
        format!("{}/index.json", self.base)
    }

    pub fn hashes(&self) -> String {
        format!("{}/hashes.json", self.base)
    }

    pub fn channel(&self, channel_id: &str) -> String {
        format!("{}/{channel_id}", self.base)
    }

    /// CSV of one message batch, named after the batch's first post.
    pub fn messages_batch(&self, channel_id: &str, create_at: i64, post_id: &str) -> String {
        format!(
            "{}/messages/messages-{create_at}-{post_id}.csv",
            self.channel(channel_id)
        )
    }

    /// Copy of an attachment referenced by the batch starting at
    /// `(create_at, post_id)`.
    pub fn attachment(
        &self,
        channel_id: &str,
        create_at: i64,
        post_id: &str,
        file_id: &str,
        file_name: &str,
    ) -> String {
        format!(
            "{}/files/files-{create_at}-{post_id}/{file_id}/{file_name}",
            self.channel(channel_id)
        )
    }
}
