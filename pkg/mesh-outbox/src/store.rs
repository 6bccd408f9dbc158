//! The outbox's durable ledger (spec.md §6 `mesh_outbox` table) and the
//! trait a dispatcher shard polls. The in-memory implementation here uses a
//! single mutex as its transaction boundary — on a single node process the
//! "same transaction that advances `committed_seq`" requirement (spec.md
//! §4.E) reduces to "insert happens while holding the same lock the DSG
//! apply path holds while advancing its commit bookkeeping", which callers
//! are expected to arrange (see `mesh-service`'s DSG `StateMachine`).

use std::collections::HashMap;

use async_std::sync::Mutex;

use mesh_common::errors::Result;
use mesh_common::ids::{NodeId, StreamId};

use crate::entry::{OutboxEntry, OutboxState};

#[async_trait::async_trait]
pub trait OutboxStore: Send + Sync + 'static {
    async fn insert(&self, entry: OutboxEntry) -> Result<()>;

    /// Rows this shard owns (`stream_id mod shard_count`, spec.md §4.E) that
    /// are `pending` and ready to retry now.
    async fn claim_ready(
        &self,
        shard_index: u32,
        shard_count: u32,
        now_millis: u64,
    ) -> Result<Vec<OutboxEntry>>;

    async fn mark_in_flight(&self, key: (StreamId, u64, NodeId)) -> Result<()>;
    async fn mark_acked(&self, key: (StreamId, u64, NodeId)) -> Result<()>;
    async fn mark_retry(&self, key: (StreamId, u64, NodeId), next_retry_at_millis: u64) -> Result<()>;
    async fn mark_failed_permanent(&self, key: (StreamId, u64, NodeId)) -> Result<()>;

    /// Returns an `in_flight` row to `pending` without incrementing
    /// `attempts` (spec.md §4.D credit backpressure isn't a delivery
    /// failure; see `DispatchOutcome::NoCredit`).
    async fn release_without_penalty(&self, key: (StreamId, u64, NodeId), next_retry_at_millis: u64) -> Result<()>;

    /// Startup recovery (spec.md §4.E): any row left `in_flight` from before
    /// a crash goes back to `pending`; the receiver's dedup window absorbs a
    /// redundant resend if the ack had actually landed.
    async fn requeue_in_flight(&self) -> Result<()>;

    async fn get(&self, key: (StreamId, u64, NodeId)) -> Result<Option<OutboxEntry>>;
}

#[derive(Default)]
pub struct MemOutboxStore {
    rows: Mutex<HashMap<(StreamId, u64, NodeId), OutboxEntry>>,
}

fn shard_of(stream_id: StreamId, shard_count: u32) -> u32 {
    (stream_id.0 % shard_count as u128) as u32
}

#[async_trait::async_trait]
impl OutboxStore for MemOutboxStore {
    async fn insert(&self, entry: OutboxEntry) -> Result<()> {
        self.rows.lock().await.insert(entry.key(), entry);
        Ok(())
    }

    async fn claim_ready(
        &self,
        shard_index: u32,
        shard_count: u32,
        now_millis: u64,
    ) -> Result<Vec<OutboxEntry>> {
        let mut guard = self.rows.lock().await;
        let mut ready = vec![];
        for entry in guard.values_mut() {
            if shard_of(entry.stream_id, shard_count) != shard_index {
                continue;
            }
            if entry.state == OutboxState::Pending && entry.next_retry_at_millis <= now_millis {
                entry.state = OutboxState::InFlight;
                ready.push(entry.clone());
            }
        }
        Ok(ready)
    }

    async fn mark_in_flight(&self, key: (StreamId, u64, NodeId)) -> Result<()> {
        if let Some(entry) = self.rows.lock().await.get_mut(&key) {
            entry.state = OutboxState::InFlight;
        }
        Ok(())
    }

    async fn mark_acked(&self, key: (StreamId, u64, NodeId)) -> Result<()> {
        if let Some(entry) = self.rows.lock().await.get_mut(&key) {
            entry.state = OutboxState::Acked;
        }
        Ok(())
    }

    async fn mark_retry(&self, key: (StreamId, u64, NodeId), next_retry_at_millis: u64) -> Result<()> {
        if let Some(entry) = self.rows.lock().await.get_mut(&key) {
            entry.state = OutboxState::Pending;
            entry.attempts += 1;
            entry.next_retry_at_millis = next_retry_at_millis;
        }
        Ok(())
    }

    async fn mark_failed_permanent(&self, key: (StreamId, u64, NodeId)) -> Result<()> {
        if let Some(entry) = self.rows.lock().await.get_mut(&key) {
            entry.state = OutboxState::FailedPermanent;
        }
        Ok(())
    }

    async fn release_without_penalty(&self, key: (StreamId, u64, NodeId), next_retry_at_millis: u64) -> Result<()> {
        if let Some(entry) = self.rows.lock().await.get_mut(&key) {
            entry.state = OutboxState::Pending;
            entry.next_retry_at_millis = next_retry_at_millis;
        }
        Ok(())
    }

    async fn requeue_in_flight(&self) -> Result<()> {
        let mut guard = self.rows.lock().await;
        for entry in guard.values_mut() {
            if entry.state == OutboxState::InFlight {
                entry.state = OutboxState::Pending;
            }
        }
        Ok(())
    }

    async fn get(&self, key: (StreamId, u64, NodeId)) -> Result<Option<OutboxEntry>> {
        Ok(self.rows.lock().await.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::PayloadRef;

    fn test_entry(seq: u64) -> OutboxEntry {
        OutboxEntry::new(
            StreamId(1),
            seq,
            NodeId(2),
            mesh_common::model::Qos::Reliable,
            PayloadRef {
                stream_id: StreamId(1),
                log_index: seq,
            },
            0,
        )
    }

    #[async_std::test]
    async fn claim_ready_only_returns_owned_shard() {
        let store = MemOutboxStore::default();
        store.insert(test_entry(1)).await.unwrap();

        let shard = shard_of(StreamId(1), 4);
        let claimed_right_shard = store.claim_ready(shard, 4, 1000).await.unwrap();
        assert_eq!(claimed_right_shard.len(), 1);

        store.mark_retry(claimed_right_shard[0].key(), 0).await.unwrap();
        let other_shard = (shard + 1) % 4;
        let claimed_wrong_shard = store.claim_ready(other_shard, 4, 1000).await.unwrap();
        assert!(claimed_wrong_shard.is_empty());
    }

    #[async_std::test]
    async fn crash_recovery_resets_in_flight_to_pending() {
        let store = MemOutboxStore::default();
        store.insert(test_entry(1)).await.unwrap();
        let key = test_entry(1).key();
        store.mark_in_flight(key).await.unwrap();

        store.requeue_in_flight().await.unwrap();
        let entry = store.get(key).await.unwrap().unwrap();
        assert_eq!(entry.state, OutboxState::Pending);
    }
}
