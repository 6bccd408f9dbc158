//! File-backed `LogStore` (spec.md §6 `raft_logs`). Kept as a single
//! bincode-encoded file rewritten atomically (write to a `.tmp` sibling,
//! fsync, rename over the original) rather than a real LSM/append log: group
//! logs are bounded by `snapshot_entry_threshold` before compaction, so the
//! whole-file rewrite stays cheap.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_std::fs;
use async_std::sync::Mutex;

use mesh_common::errors::{format_err, Result};
use mesh_raft::store::LogStore;
use mesh_raft::types::{LogEntry, LogIndex, Term};

pub struct FileLogStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<LogIndex, LogEntry>>,
}

impl FileLogStore {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let entries = match fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => {
                bincode::deserialize(&bytes).map_err(|e| format_err!("decode raft log file: {}", e))?
            }
            _ => BTreeMap::new(),
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    async fn persist(&self, entries: &BTreeMap<LogIndex, LogEntry>) -> Result<()> {
        let bytes = bincode::serialize(entries).map_err(|e| format_err!("encode raft log file: {}", e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LogStore for FileLogStore {
    async fn append(&self, new_entries: Vec<LogEntry>) -> Result<()> {
        let mut guard = self.entries.lock().await;
        for entry in new_entries {
            guard.insert(entry.index, entry);
        }
        self.persist(&guard).await
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
        let mut guard = self.entries.lock().await;
        guard.retain(|index, _| *index < from);
        self.persist(&guard).await
    }

    async fn compact_through(&self, through: LogIndex) -> Result<()> {
        let mut guard = self.entries.lock().await;
        guard.retain(|index, _| *index > through);
        self.persist(&guard).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_raft::types::LogEntryData;

    #[async_std::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft_log");

        {
            let store = FileLogStore::open(&path).await.unwrap();
            store
                .append(vec![LogEntry {
                    index: 1,
                    term: 1,
                    data: LogEntryData::Noop,
                }])
                .await
                .unwrap();
        }

        let reopened = FileLogStore::open(&path).await.unwrap();
        assert_eq!(reopened.last_index().await.unwrap(), 1);
        assert!(reopened.get(1).await.unwrap().is_some());
    }

    #[async_std::test]
    async fn truncate_and_compact_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft_log");
        let store = FileLogStore::open(&path).await.unwrap();
        store
            .append(vec![
                LogEntry { index: 1, term: 1, data: LogEntryData::Noop },
                LogEntry { index: 2, term: 1, data: LogEntryData::Noop },
                LogEntry { index: 3, term: 1, data: LogEntryData::Noop },
            ])
            .await
            .unwrap();
        store.compact_through(1).await.unwrap();
        store.truncate_from(3).await.unwrap();

        let reopened = FileLogStore::open(&path).await.unwrap();
        assert!(reopened.get(1).await.unwrap().is_none());
        assert!(reopened.get(2).await.unwrap().is_some());
        assert!(reopened.get(3).await.unwrap().is_none());
    }
}
