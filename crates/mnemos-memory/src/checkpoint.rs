//! Named, immutable snapshots of the engine state.

use chrono::{DateTime, Utc};
use mnemos_core::{MnemosError, MnemosResult};
use std::sync::Arc;

use crate::snapshot::{Checkpoint, CheckpointMeta, IndexSnapshot, SnapshotStore};

const MAX_NAME_LEN: usize = 64;

/// Check a checkpoint name: 1-64 characters of `[A-Za-z0-9_.-]`, no leading dot.
pub fn validate_name(name: &str) -> MnemosResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(MnemosError::Validation(format!(
            "checkpoint name must be 1-{MAX_NAME_LEN} characters"
        )));
    }
    if name.starts_with('.') {
        return Err(MnemosError::Validation(
            "checkpoint name must not start with '.'".into(),
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(MnemosError::Validation(format!(
            "checkpoint name contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

/// Creates, lists, and loads checkpoints in a [`SnapshotStore`].
///
/// Loading only verifies and returns the snapshot; swapping it into the live
/// engine is the engine's job.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn SnapshotStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Seal and store `snapshot` under `name`.
    pub async fn create(
        &self,
        name: &str,
        description: &str,
        snapshot: IndexSnapshot,
        now: DateTime<Utc>,
    ) -> MnemosResult<CheckpointMeta> {
        validate_name(name)?;
        let meta = CheckpointMeta {
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
            entry_count: snapshot.entries.len(),
        };
        let checkpoint = Checkpoint::seal(meta.clone(), snapshot)?;
        self.store.put_checkpoint(&checkpoint).await?;
        tracing::info!(
            checkpoint = %name,
            entries = meta.entry_count,
            checksum = %checkpoint.checksum,
            "Checkpoint created"
        );
        Ok(meta)
    }

    /// All checkpoints, oldest first.
    pub async fn list(&self) -> MnemosResult<Vec<CheckpointMeta>> {
        let mut metas = self.store.list_checkpoints().await?;
        metas.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(metas)
    }

    /// Fetch a checkpoint and verify its checksum.
    pub async fn load(&self, name: &str) -> MnemosResult<Checkpoint> {
        validate_name(name).map_err(|_| MnemosError::CheckpointNotFound(name.to_string()))?;
        let checkpoint = self
            .store
            .get_checkpoint(name)
            .await?
            .ok_or_else(|| MnemosError::CheckpointNotFound(name.to_string()))?;
        checkpoint.verify()?;
        Ok(checkpoint)
    }
}
