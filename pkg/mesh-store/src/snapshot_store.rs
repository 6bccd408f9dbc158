//! File-backed `SnapshotStore` (spec.md §6 `raft_snapshots`). Only the
//! latest snapshot is kept on disk: once a newer one is saved, the group
//! has no use for an older one (its covered log prefix is already
//! compacted away by `LogStore::compact_through`).

use std::path::{Path, PathBuf};

use async_std::fs;
use async_std::sync::Mutex;

use mesh_common::errors::{format_err, Result};
use mesh_raft::store::SnapshotStore;
use mesh_raft::types::Snapshot;

pub struct FileSnapshotStore {
    path: PathBuf,
    cached: Mutex<Option<Snapshot>>,
}

impl FileSnapshotStore {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let cached = match fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => {
                Some(bincode::deserialize(&bytes).map_err(|e| format_err!("decode raft snapshot: {}", e))?)
            }
            _ => None,
        };
        Ok(Self {
            path: path.to_path_buf(),
            cached: Mutex::new(cached),
        })
    }
}

#[async_trait::async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: Snapshot) -> Result<()> {
        let bytes = bincode::serialize(&snapshot).map_err(|e| format_err!("encode raft snapshot: {}", e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        *self.cached.lock().await = Some(snapshot);
        Ok(())
    }

    async fn load_latest(&self) -> Result<Option<Snapshot>> {
        Ok(self.cached.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_raft::types::{Configuration, SnapshotMeta};

    #[async_std::test]
    async fn rejects_nothing_and_persists_latest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft_snapshot");
        let store = FileSnapshotStore::open(&path).await.unwrap();
        assert!(store.load_latest().await.unwrap().is_none());

        let snapshot = Snapshot {
            meta: SnapshotMeta {
                last_included_index: 10,
                last_included_term: 2,
                configuration: Configuration::default(),
            },
            data: vec![1, 2, 3],
        };
        store.save(snapshot.clone()).await.unwrap();

        let reopened = FileSnapshotStore::open(&path).await.unwrap();
        let loaded = reopened.load_latest().await.unwrap().unwrap();
        assert_eq!(loaded.meta.last_included_index, 10);
    }
}
