//! Storage seams the engine drives: `LogStore`, `StableStore`, and
//! `SnapshotStore` (spec.md §4.C, §6 `raft_logs`/`raft_stable_store`/
//! `raft_snapshots`). The in-memory implementations here back unit tests and
//! any ephemeral group; `mesh-store` provides the file-backed ones used in
//! production configuration.

use std::collections::BTreeMap;

use async_std::sync::Mutex;

use mesh_common::errors::Result;

use crate::types::{LogEntry, LogIndex, Metadata, Snapshot, Term};

#[async_trait::async_trait]
pub trait LogStore: Send + Sync + 'static {
    async fn append(&self, entries: Vec<LogEntry>) -> Result<()>;
    async fn get(&self, index: LogIndex) -> Result<Option<LogEntry>>;
    async fn range(&self, start: LogIndex, end: LogIndex) -> Result<Vec<LogEntry>>;
    /// Drops every entry with index >= `from` (used to resolve a conflict
    /// with a leader's log, spec.md §4.C log-matching property).
    async fn truncate_from(&self, from: LogIndex) -> Result<()>;
    /// Drops every entry with index <= `through` (after a snapshot compacts
    /// the prefix away).
    async fn compact_through(&self, through: LogIndex) -> Result<()>;
    async fn last_index(&self) -> Result<LogIndex>;
    async fn last_term(&self) -> Result<Term>;
}

#[async_trait::async_trait]
pub trait StableStore: Send + Sync + 'static {
    async fn load_metadata(&self) -> Result<Metadata>;
    async fn save_metadata(&self, metadata: Metadata) -> Result<()>;
}

#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    async fn save(&self, snapshot: Snapshot) -> Result<()>;
    async fn load_latest(&self) -> Result<Option<Snapshot>>;
}

#[derive(Default)]
pub struct MemLogStore {
    entries: Mutex<BTreeMap<LogIndex, LogEntry>>,
}

#[async_trait::async_trait]
impl LogStore for MemLogStore {
    async fn append(&self, entries: Vec<LogEntry>) -> Result<()> {
        let mut guard = self.entries.lock().await;
        for entry in entries {
            guard.insert(entry.index, entry);
        }
        Ok(())
    }

    async fn get(&self, index: LogIndex) -> Result<Option<LogEntry>> {
        Ok(self.entries.lock().await.get(&index).cloned())
    }

    async fn range(&self, start: LogIndex, end: LogIndex) -> Result<Vec<LogEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .range(start..end)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn truncate_from(&self, from: LogIndex) -> Result<()> {
        self.entries.lock().await.retain(|index, _| *index < from);
        Ok(())
    }

    async fn compact_through(&self, through: LogIndex) -> Result<()> {
        self.entries.lock().await.retain(|index, _| *index > through);
        Ok(())
    }

    async fn last_index(&self) -> Result<LogIndex> {
        Ok(self.entries.lock().await.keys().next_back().copied().unwrap_or(0))
    }

    async fn last_term(&self) -> Result<Term> {
        Ok(self
            .entries
            .lock()
            .await
            .values()
            .next_back()
            .map(|e| e.term)
            .unwrap_or(0))
    }
}

#[derive(Default)]
pub struct MemStableStore {
    metadata: Mutex<Metadata>,
}

#[async_trait::async_trait]
impl StableStore for MemStableStore {
    async fn load_metadata(&self) -> Result<Metadata> {
        Ok(self.metadata.lock().await.clone())
    }

    async fn save_metadata(&self, metadata: Metadata) -> Result<()> {
        *self.metadata.lock().await = metadata;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemSnapshotStore {
    latest: Mutex<Option<Snapshot>>,
}

#[async_trait::async_trait]
impl SnapshotStore for MemSnapshotStore {
    async fn save(&self, snapshot: Snapshot) -> Result<()> {
        *self.latest.lock().await = Some(snapshot);
        Ok(())
    }

    async fn load_latest(&self) -> Result<Option<Snapshot>> {
        Ok(self.latest.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogEntryData;

    #[async_std::test]
    async fn truncate_from_drops_suffix() {
        let store = MemLogStore::default();
        store
            .append(vec![
                LogEntry { index: 1, term: 1, data: LogEntryData::Noop },
                LogEntry { index: 2, term: 1, data: LogEntryData::Noop },
                LogEntry { index: 3, term: 1, data: LogEntryData::Noop },
            ])
            .await
            .unwrap();

        store.truncate_from(2).await.unwrap();
        assert_eq!(store.last_index().await.unwrap(), 1);
        assert!(store.get(2).await.unwrap().is_none());
    }

    #[async_std::test]
    async fn compact_through_drops_prefix() {
        let store = MemLogStore::default();
        store
            .append(vec![
                LogEntry { index: 1, term: 1, data: LogEntryData::Noop },
                LogEntry { index: 2, term: 1, data: LogEntryData::Noop },
            ])
            .await
            .unwrap();
        store.compact_through(1).await.unwrap();
        assert!(store.get(1).await.unwrap().is_none());
        assert!(store.get(2).await.unwrap().is_some());
    }
}
