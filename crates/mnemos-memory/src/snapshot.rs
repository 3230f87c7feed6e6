//! Serializable engine state and the storage backends that hold it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemos_core::{EntryId, MnemosError, MnemosResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::bm25::Bm25Index;
use crate::entry::MemoryEntry;
use crate::vector::VectorIndex;

/// Bumped whenever [`IndexSnapshot`] changes shape.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Full point-in-time copy of the entry arena and both indexes.
///
/// The trigger matcher is derived from the entries and is rebuilt on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    /// Next id the engine will hand out.
    pub next_id: EntryId,
    /// Entries in ascending id order.
    pub entries: Vec<MemoryEntry>,
    pub keyword: Bm25Index,
    pub vector: VectorIndex,
}

/// Listing information for a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub entry_count: usize,
}

/// A named, checksummed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub meta: CheckpointMeta,
    /// Hex SHA-256 of the JSON-encoded `state`.
    pub checksum: String,
    pub state: IndexSnapshot,
}

impl Checkpoint {
    /// Wrap a snapshot, computing its checksum.
    pub fn seal(meta: CheckpointMeta, state: IndexSnapshot) -> MnemosResult<Self> {
        let checksum = state_checksum(&state)?;
        Ok(Self {
            meta,
            checksum,
            state,
        })
    }

    /// Recompute the checksum and compare it with the stored one.
    pub fn verify(&self) -> MnemosResult<()> {
        let actual = state_checksum(&self.state)?;
        if actual != self.checksum {
            return Err(MnemosError::restore_failed(format!(
                "checkpoint '{}' checksum mismatch (stored {}, computed {actual})",
                self.meta.name, self.checksum
            )));
        }
        Ok(())
    }
}

fn state_checksum(state: &IndexSnapshot) -> MnemosResult<String> {
    let bytes = serde_json::to_vec(state)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Persistent home for checkpoints and the live state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store a new checkpoint. Fails if the name is taken.
    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> MnemosResult<()>;

    /// Load a checkpoint by name.
    async fn get_checkpoint(&self, name: &str) -> MnemosResult<Option<Checkpoint>>;

    /// Metadata of every stored checkpoint, in no particular order.
    async fn list_checkpoints(&self) -> MnemosResult<Vec<CheckpointMeta>>;

    /// Overwrite the persisted live state.
    async fn save_live(&self, snapshot: &IndexSnapshot) -> MnemosResult<()>;

    /// Load the persisted live state, if any was saved.
    async fn load_live(&self) -> MnemosResult<Option<IndexSnapshot>>;
}

/// Process-local snapshot store.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
    live: RwLock<Option<IndexSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> MnemosResult<()> {
        let mut checkpoints = self.checkpoints.write().await;
        if checkpoints.contains_key(&checkpoint.meta.name) {
            return Err(MnemosError::Validation(format!(
                "checkpoint '{}' already exists",
                checkpoint.meta.name
            )));
        }
        checkpoints.insert(checkpoint.meta.name.clone(), checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(&self, name: &str) -> MnemosResult<Option<Checkpoint>> {
        Ok(self.checkpoints.read().await.get(name).cloned())
    }

    async fn list_checkpoints(&self) -> MnemosResult<Vec<CheckpointMeta>> {
        Ok(self
            .checkpoints
            .read()
            .await
            .values()
            .map(|c| c.meta.clone())
            .collect())
    }

    async fn save_live(&self, snapshot: &IndexSnapshot) -> MnemosResult<()> {
        *self.live.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn load_live(&self) -> MnemosResult<Option<IndexSnapshot>> {
        Ok(self.live.read().await.clone())
    }
}

/// JSON files under a data directory:
///
/// ```text
/// <dir>/live.json
/// <dir>/checkpoints/<name>.json
/// ```
///
/// Every write goes to a `.tmp` sibling that is synced and renamed into place.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

/// Checkpoint file prefix used for listing without decoding whole snapshots.
#[derive(Deserialize)]
struct CheckpointHeader {
    meta: CheckpointMeta,
}

impl FileSnapshotStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn new(dir: impl Into<PathBuf>) -> MnemosResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(dir.join("checkpoints"))
            .await
            .map_err(|e| MnemosError::Storage(format!("Failed to create data dir: {e}")))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn live_path(&self) -> PathBuf {
        self.dir.join("live.json")
    }

    fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.dir.join("checkpoints").join(format!("{name}.json"))
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> MnemosResult<()> {
        use tokio::io::AsyncWriteExt;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let failed = |action: &str, e: std::io::Error| {
            MnemosError::Storage(format!("Failed to {action} {}: {e}", tmp.display()))
        };

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| failed("create", e))?;
        file.write_all(bytes).await.map_err(|e| failed("write", e))?;
        file.sync_all().await.map_err(|e| failed("sync", e))?;
        drop(file);

        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            MnemosError::Storage(format!("Failed to replace {}: {e}", path.display()))
        })
    }

    async fn read_optional(path: &Path) -> MnemosResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MnemosError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> MnemosResult<()> {
        let path = self.checkpoint_path(&checkpoint.meta.name);
        if tokio::fs::try_exists(&path).await? {
            return Err(MnemosError::Validation(format!(
                "checkpoint '{}' already exists",
                checkpoint.meta.name
            )));
        }
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        self.write_atomic(&path, &bytes).await
    }

    async fn get_checkpoint(&self, name: &str) -> MnemosResult<Option<Checkpoint>> {
        match Self::read_optional(&self.checkpoint_path(name)).await? {
            Some(bytes) => {
                let checkpoint = serde_json::from_slice(&bytes).map_err(|e| {
                    MnemosError::restore_failed(format!("checkpoint '{name}' is unreadable: {e}"))
                })?;
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    async fn list_checkpoints(&self) -> MnemosResult<Vec<CheckpointMeta>> {
        let mut metas = Vec::new();
        let mut dir = tokio::fs::read_dir(self.dir.join("checkpoints")).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<CheckpointHeader>(&bytes) {
                Ok(header) => metas.push(header.meta),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable checkpoint file"
                    );
                }
            }
        }
        Ok(metas)
    }

    async fn save_live(&self, snapshot: &IndexSnapshot) -> MnemosResult<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.write_atomic(&self.live_path(), &bytes).await
    }

    async fn load_live(&self) -> MnemosResult<Option<IndexSnapshot>> {
        match Self::read_optional(&self.live_path()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn empty_snapshot() -> IndexSnapshot {
        IndexSnapshot {
            version: SNAPSHOT_FORMAT_VERSION,
            next_id: 1,
            entries: Vec::new(),
            keyword: Bm25Index::new(),
            vector: VectorIndex::new(),
        }
    }

    fn checkpoint(name: &str) -> Checkpoint {
        let mut state = empty_snapshot();
        state.keyword.add_document(1, "rust borrow checker");
        Checkpoint::seal(
            CheckpointMeta {
                name: name.to_string(),
                description: "test".to_string(),
                created_at: Utc::now(),
                entry_count: 0,
            },
            state,
        )
        .unwrap()
    }

    #[test]
    fn test_checksum_detects_tampering() {
        let mut cp = checkpoint("a");
        assert!(cp.verify().is_ok());
        cp.state.next_id = 99;
        let err = cp.verify().unwrap_err();
        assert!(matches!(err, MnemosError::RestoreFailed { retryable: false, .. }));
    }

    #[test]
    fn test_checksum_stable_across_serde() {
        let cp = checkpoint("a");
        let json = serde_json::to_string(&cp).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert!(back.verify().is_ok());
    }

    #[tokio::test]
    async fn test_in_memory_store_rejects_duplicate_names() {
        let store = InMemorySnapshotStore::new();
        store.put_checkpoint(&checkpoint("dup")).await.unwrap();
        assert!(store.put_checkpoint(&checkpoint("dup")).await.is_err());
        assert_eq!(store.list_checkpoints().await.unwrap().len(), 1);
        assert!(store.get_checkpoint("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(tmp.path()).await.unwrap();

        assert!(store.load_live().await.unwrap().is_none());
        store.save_live(&empty_snapshot()).await.unwrap();
        assert_eq!(store.load_live().await.unwrap(), Some(empty_snapshot()));

        let cp = checkpoint("before-refactor");
        store.put_checkpoint(&cp).await.unwrap();
        assert!(store.put_checkpoint(&cp).await.is_err());

        let loaded = store.get_checkpoint("before-refactor").await.unwrap().unwrap();
        assert_eq!(loaded, cp);

        let metas = store.list_checkpoints().await.unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].name, "before-refactor");

        assert!(!tmp.path().join("live.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_skips_garbage_in_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(tmp.path()).await.unwrap();
        std::fs::write(tmp.path().join("checkpoints").join("junk.json"), b"not json").unwrap();
        store.put_checkpoint(&checkpoint("good")).await.unwrap();

        let metas = store.list_checkpoints().await.unwrap();
        assert_eq!(metas.len(), 1);
        assert!(store.get_checkpoint("junk").await.is_err());
    }
}
