//! File-backed storage seams for component C's `LogStore`/`StableStore`/
//! `SnapshotStore` traits (spec.md §6 `raft_logs`/`raft_stable_store`/
//! `raft_snapshots` tables), selected by `mesh_common::config::StoreBackend`.
//!
//! Layout follows the teacher's `SyncedFile`/`SyncedPath` idiom
//! (`pkg/common/src/fs/sync.rs`): writes are flushed and the file (and, for
//! newly created files, its parent directory) fsync'd before a write is
//! considered durable. There's no real sstable/LSM structure here — each
//! store is a single small file rewritten wholesale on mutation, which is
//! adequate for the log sizes a node's own consensus groups produce and
//! avoids reimplementing a B-tree/LSM engine outside this crate's scope.

pub mod log_store;
pub mod snapshot_store;
pub mod stable_store;

pub use log_store::FileLogStore;
pub use snapshot_store::FileSnapshotStore;
pub use stable_store::FileStableStore;

use std::path::Path;
use std::sync::Arc;

use mesh_common::config::StoreBackend;
use mesh_common::errors::Result;
use mesh_raft::store::{LogStore, SnapshotStore, StableStore};
use mesh_raft::store::{MemLogStore, MemSnapshotStore, MemStableStore};

/// Builds the concrete store an engine should use for one group, given the
/// node's configured backend and the group's id (each group gets its own
/// file/subdirectory so groups never share state).
pub async fn open_log_store(backend: &StoreBackend, group_id: &str) -> Result<Arc<dyn LogStore>> {
    match backend {
        StoreBackend::Memory => Ok(Arc::new(MemLogStore::default())),
        StoreBackend::File { dir } => {
            let path = group_dir(dir, group_id).join("raft_log");
            Ok(Arc::new(FileLogStore::open(&path).await?))
        }
    }
}

pub async fn open_stable_store(backend: &StoreBackend, group_id: &str) -> Result<Arc<dyn StableStore>> {
    match backend {
        StoreBackend::Memory => Ok(Arc::new(MemStableStore::default())),
        StoreBackend::File { dir } => {
            let path = group_dir(dir, group_id).join("raft_stable");
            Ok(Arc::new(FileStableStore::open(&path).await?))
        }
    }
}

pub async fn open_snapshot_store(backend: &StoreBackend, group_id: &str) -> Result<Arc<dyn SnapshotStore>> {
    match backend {
        StoreBackend::Memory => Ok(Arc::new(MemSnapshotStore::default())),
        StoreBackend::File { dir } => {
            let path = group_dir(dir, group_id).join("raft_snapshot");
            Ok(Arc::new(FileSnapshotStore::open(&path).await?))
        }
    }
}

fn group_dir(root: &Path, group_id: &str) -> std::path::PathBuf {
    root.join(group_id)
}
