//! File-backed `StableStore` (spec.md §6 `raft_stable_store`): the handful
//! of fields (`current_term`, `voted_for`, `commit_index`) a follower must
//! not forget across a restart, written to one small file per group.

use std::path::{Path, PathBuf};

use async_std::fs;
use async_std::sync::Mutex;

use mesh_common::errors::{format_err, Result};
use mesh_raft::store::StableStore;
use mesh_raft::types::Metadata;

pub struct FileStableStore {
    path: PathBuf,
    cached: Mutex<Metadata>,
}

impl FileStableStore {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let cached = match fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => {
                bincode::deserialize(&bytes).map_err(|e| format_err!("decode raft stable store: {}", e))?
            }
            _ => Metadata::default(),
        };
        Ok(Self {
            path: path.to_path_buf(),
            cached: Mutex::new(cached),
        })
    }
}

#[async_trait::async_trait]
impl StableStore for FileStableStore {
    async fn load_metadata(&self) -> Result<Metadata> {
        Ok(self.cached.lock().await.clone())
    }

    async fn save_metadata(&self, metadata: Metadata) -> Result<()> {
        let bytes = bincode::serialize(&metadata).map_err(|e| format_err!("encode raft stable store: {}", e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        *self.cached.lock().await = metadata;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft_stable");

        {
            let store = FileStableStore::open(&path).await.unwrap();
            store
                .save_metadata(Metadata {
                    current_term: 4,
                    voted_for: None,
                    commit_index: 7,
                })
                .await
                .unwrap();
        }

        let reopened = FileStableStore::open(&path).await.unwrap();
        let metadata = reopened.load_metadata().await.unwrap();
        assert_eq!(metadata.current_term, 4);
        assert_eq!(metadata.commit_index, 7);
    }
}
