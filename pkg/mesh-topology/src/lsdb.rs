//! The Link-State Database: `node_id -> latest LSA` (spec.md §4.B).
//!
//! Single-writer, many-reader (spec.md §5): the LSDB refresher task is the
//! only writer; readers (router, path cache, status RPC) take a versioned
//! snapshot via `Lsdb::snapshot` so they never block the writer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_std::sync::RwLock;

use mesh_common::ids::NodeId;

use crate::lsa::Lsa;

#[derive(Default)]
struct Inner {
    entries: HashMap<NodeId, Lsa>,
    /// Active MCG membership. LSAs from nodes outside this set are dropped
    /// (spec.md §4.B: "LSAs from non-members are silently dropped").
    members: HashSet<NodeId>,
    version: u64,
}

#[derive(Clone)]
pub struct Lsdb {
    inner: Arc<RwLock<Inner>>,
}

impl Default for Lsdb {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    DroppedStale,
    DroppedNonMember,
}

impl Lsdb {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Installs `lsa` if its origin is a current member and it strictly
    /// beats the stored sequence (spec.md §3, §4.B).
    pub async fn apply(&self, lsa: Lsa) -> ApplyOutcome {
        let mut inner = self.inner.write().await;
        if !inner.members.contains(&lsa.origin_node) {
            return ApplyOutcome::DroppedNonMember;
        }
        let existing = inner.entries.get(&lsa.origin_node);
        if !lsa.supersedes(existing) {
            return ApplyOutcome::DroppedStale;
        }
        inner.entries.insert(lsa.origin_node, lsa);
        inner.version += 1;
        ApplyOutcome::Applied
    }

    /// Applies an MCG-committed membership reconciliation (spec.md §4.B):
    /// pruning a node's LSA immediately when it is removed, so stale entries
    /// can never be served to path computation.
    pub async fn reconcile_membership(&self, members: HashSet<NodeId>) {
        let mut inner = self.inner.write().await;
        let removed: Vec<NodeId> = inner
            .entries
            .keys()
            .filter(|id| !members.contains(id))
            .copied()
            .collect();
        for id in removed {
            inner.entries.remove(&id);
        }
        inner.members = members;
        inner.version += 1;
    }

    pub async fn sequence_for(&self, origin: NodeId) -> Option<u64> {
        self.inner.read().await.entries.get(&origin).map(|l| l.sequence)
    }

    pub async fn version(&self) -> u64 {
        self.inner.read().await.version
    }

    /// A point-in-time copy of every known LSA, used for path computation and
    /// status reporting. Cloning here (rather than handing out a guard) keeps
    /// path computation off the write-lock entirely (spec.md §5).
    pub async fn snapshot(&self) -> HashMap<NodeId, Lsa> {
        self.inner.read().await.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lsa(origin: u128, seq: u64) -> Lsa {
        Lsa {
            origin_node: NodeId(origin),
            sequence: seq,
            neighbors: vec![],
            signature: vec![],
        }
    }

    #[async_std::test]
    async fn newer_sequence_replaces_older() {
        let db = Lsdb::new();
        db.reconcile_membership(HashSet::from([NodeId(1)])).await;

        assert_eq!(db.apply(lsa(1, 5)).await, ApplyOutcome::Applied);
        assert_eq!(db.apply(lsa(1, 3)).await, ApplyOutcome::DroppedStale);
        assert_eq!(db.apply(lsa(1, 9)).await, ApplyOutcome::Applied);
        assert_eq!(db.sequence_for(NodeId(1)).await, Some(9));
    }

    #[async_std::test]
    async fn non_member_lsa_is_dropped() {
        let db = Lsdb::new();
        db.reconcile_membership(HashSet::from([NodeId(1)])).await;
        assert_eq!(db.apply(lsa(2, 1)).await, ApplyOutcome::DroppedNonMember);
    }

    #[async_std::test]
    async fn eviction_prunes_entry() {
        let db = Lsdb::new();
        db.reconcile_membership(HashSet::from([NodeId(1), NodeId(2)]))
            .await;
        db.apply(lsa(2, 1)).await;
        assert!(db.sequence_for(NodeId(2)).await.is_some());

        db.reconcile_membership(HashSet::from([NodeId(1)])).await;
        assert!(db.sequence_for(NodeId(2)).await.is_none());
    }
}
