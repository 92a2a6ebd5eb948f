//! Local persistence of engine state.
//!
//! State is kept as opaque string blobs under string keys. Only the item
//! state is persisted; connectivity and sync progress start fresh.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use swizil_engine::{EngineSnapshot, SnapshotMetadata};

/// Prefix applied to every blob key.
pub const KEY_PREFIX: &str = "swizil_";

/// Key of the engine snapshot blob.
pub const SNAPSHOT_KEY: &str = "items";

/// Opaque key-value blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, blob: &str) -> Result<()>;
    async fn clear(&self, key: &str) -> Result<()>;
}

/// Blobs as JSON files in a directory, one file per key.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{KEY_PREFIX}{key}.json"))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, blob: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so a crash never leaves a torn blob.
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs().get(key).cloned())
    }

    async fn save(&self, key: &str, blob: &str) -> Result<()> {
        self.blobs().insert(key.to_string(), blob.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.blobs().remove(key);
        Ok(())
    }
}

/// Load the persisted engine snapshot, if any.
pub async fn load_snapshot(store: &dyn BlobStore) -> Result<Option<EngineSnapshot>> {
    let Some(blob) = store.load(SNAPSHOT_KEY).await? else {
        return Ok(None);
    };

    let snapshot = EngineSnapshot::from_json(&blob)?;
    let meta = SnapshotMetadata::from(&snapshot);
    tracing::info!(
        items = meta.item_count,
        pending = meta.pending_count,
        "restored snapshot"
    );
    Ok(Some(snapshot))
}

/// Persist an engine snapshot.
pub async fn save_snapshot(store: &dyn BlobStore, snapshot: &EngineSnapshot) -> Result<()> {
    store.save(SNAPSHOT_KEY, &snapshot.to_json()?).await
}
