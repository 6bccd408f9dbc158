//! Component C: Consensus Groups (spec.md §4.C). One generic Raft engine
//! backs both the mesh-wide MCG and per-stream DSGs (spec.md §9); this crate
//! owns the engine, its storage seams, and the typed entry wrappers for each
//! group kind.

pub mod engine;
pub mod group;
pub mod handle;
pub mod rpc;
pub mod state_machine;
pub mod store;
pub mod transport;
pub mod types;

pub use engine::{RaftMetrics, Role};
pub use group::{DsgEntry, DsgHandle, McgEntry, McgHandle};
pub use handle::RaftHandle;
pub use state_machine::StateMachine;
pub use store::{LogStore, SnapshotStore, StableStore};
pub use transport::RaftTransport;
pub use types::{ConfigChange, Configuration, LogEntry, LogEntryData, LogIndex, Metadata, Snapshot, Term};

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;

    use async_std::sync::RwLock;

    use mesh_common::config::ConsensusConfig;
    use mesh_common::errors::{format_err, Result};
    use mesh_common::ids::NodeId;
    use mesh_executor::resource_group::ServiceResourceGroup;

    use crate::handle::RaftHandle;
    use crate::rpc::{
        AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
        PreVoteRequest, PreVoteResponse, RequestVoteRequest, RequestVoteResponse,
    };
    use crate::state_machine::StateMachine;
    use crate::store::{MemLogStore, MemSnapshotStore, MemStableStore};
    use crate::transport::RaftTransport;
    use crate::types::{Configuration, LogEntry};

    struct NoOpStateMachine;

    #[async_trait::async_trait]
    impl StateMachine for NoOpStateMachine {
        async fn apply(&self, _entry: &LogEntry) -> Result<()> {
            Ok(())
        }
        async fn snapshot(&self) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        async fn restore(&self, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    /// Routes RPCs between co-located `RaftHandle`s by node id, standing in
    /// for the real mesh transport in these engine-only tests.
    #[derive(Default, Clone)]
    struct FanoutTransport {
        peers: Arc<RwLock<HashMap<NodeId, RaftHandle>>>,
    }

    impl FanoutTransport {
        async fn register(&self, id: NodeId, handle: RaftHandle) {
            self.peers.write().await.insert(id, handle);
        }

        async fn get(&self, id: NodeId) -> Result<RaftHandle> {
            self.peers
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| format_err!("no such peer"))
        }
    }

    #[async_trait::async_trait]
    impl RaftTransport for FanoutTransport {
        async fn append_entries(&self, target: NodeId, request: AppendEntriesRequest) -> Result<AppendEntriesResponse> {
            self.get(target).await?.handle_append_entries(request).await
        }

        async fn pre_vote(&self, target: NodeId, request: PreVoteRequest) -> Result<PreVoteResponse> {
            self.get(target).await?.handle_pre_vote(request).await
        }

        async fn request_vote(&self, target: NodeId, request: RequestVoteRequest) -> Result<RequestVoteResponse> {
            self.get(target).await?.handle_request_vote(request).await
        }

        async fn install_snapshot(
            &self,
            target: NodeId,
            request: InstallSnapshotRequest,
        ) -> Result<InstallSnapshotResponse> {
            self.get(target).await?.handle_install_snapshot(request).await
        }
    }

    fn fast_config() -> ConsensusConfig {
        ConsensusConfig {
            election_timeout: Duration::from_millis(30),
            election_timeout_jitter: Duration::from_millis(20),
            heartbeat_interval: Duration::from_millis(10),
            ..ConsensusConfig::default()
        }
    }

    #[async_std::test]
    async fn elects_a_leader_and_commits_a_proposal() -> Result<()> {
        let group = ServiceResourceGroup::new("test-mcg");
        let transport = FanoutTransport::default();
        let ids = [NodeId(1), NodeId(2), NodeId(3)];
        let members = Configuration {
            members: HashSet::from(ids),
            learners: HashSet::new(),
        };

        let mut handles = vec![];
        for id in ids {
            let handle = RaftHandle::spawn(
                &format!("raft-{id}"),
                &group,
                id,
                members.clone(),
                fast_config(),
                Arc::new(MemLogStore::default()),
                Arc::new(MemStableStore::default()),
                Arc::new(MemSnapshotStore::default()),
                Arc::new(transport.clone()),
                Arc::new(NoOpStateMachine),
            )
            .await;
            transport.register(id, handle.clone()).await;
            handles.push(handle);
        }

        // Give the cluster several election-timeout windows to settle.
        async_std::task::sleep(Duration::from_millis(500)).await;

        let mut leaders = 0;
        for handle in &handles {
            if handle.is_leader().await {
                leaders += 1;
            }
        }
        assert_eq!(leaders, 1, "exactly one leader should have been elected");

        let leader = {
            let mut found = None;
            for handle in &handles {
                if handle.is_leader().await {
                    found = Some(handle.clone());
                }
            }
            found.expect("a leader exists")
        };

        let response = leader.propose(b"hello".to_vec()).await?;
        assert!(response.index > 0);

        async_std::task::sleep(Duration::from_millis(200)).await;
        let metrics = leader.metrics().await;
        assert!(metrics.commit_index >= response.index);

        Ok(())
    }
}
