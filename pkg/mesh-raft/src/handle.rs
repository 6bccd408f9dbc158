//! The public, cloneable front door to a running group (spec.md §4.C),
//! shaped after the async-raft reference's channel-plus-oneshot `Raft<D,R>`
//! API: callers never see the engine's internal state directly, only
//! request/response round trips over a channel into its single-owner task.

use std::sync::Arc;

use async_std::sync::RwLock;

use mesh_common::config::ConsensusConfig;
use mesh_common::errors::Result;
use mesh_common::ids::NodeId;
use mesh_executor::resource_group::ServiceResourceGroup;

use crate::engine::{RaftCore, RaftMetrics, RaftMsg, Role};
use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    PreVoteRequest, PreVoteResponse, ProposeResponse, RequestVoteRequest, RequestVoteResponse,
};
use crate::state_machine::StateMachine;
use crate::store::{LogStore, SnapshotStore, StableStore};
use crate::transport::RaftTransport;
use crate::types::{ConfigChange, Configuration};

#[derive(Clone)]
pub struct RaftHandle {
    tx: async_std::channel::Sender<RaftMsg>,
    metrics: Arc<RwLock<RaftMetrics>>,
}

impl RaftHandle {
    /// Constructs the engine and registers its driving task into `group`,
    /// returning a handle the rest of the node uses to interact with it.
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        name: &str,
        group: &ServiceResourceGroup,
        local_id: NodeId,
        initial_members: Configuration,
        config: ConsensusConfig,
        log: Arc<dyn LogStore>,
        stable: Arc<dyn StableStore>,
        snapshots: Arc<dyn SnapshotStore>,
        transport: Arc<dyn RaftTransport>,
        state_machine: Arc<dyn StateMachine>,
    ) -> Self {
        let (tx, rx) = async_std::channel::unbounded();
        let metrics = Arc::new(RwLock::new(RaftMetrics {
            role: Role::Follower,
            current_term: 0,
            last_log_index: 0,
            commit_index: 0,
            current_leader: None,
        }));

        let core = RaftCore::new(
            local_id,
            initial_members,
            config,
            log,
            stable,
            snapshots,
            transport,
            state_machine,
            rx,
            metrics.clone(),
        );

        group
            .spawn(name, move |token| async move { core.run(token).await })
            .await;

        Self { tx, metrics }
    }

    pub async fn metrics(&self) -> RaftMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn is_leader(&self) -> bool {
        self.metrics().await.role == Role::Leader
    }

    pub async fn propose(&self, data: Vec<u8>) -> Result<ProposeResponse> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.tx
            .send(RaftMsg::Propose { data, tx })
            .await
            .map_err(|_| mesh_common::errors::format_err!("raft engine is no longer running"))?;
        rx.await
            .map_err(|_| mesh_common::errors::format_err!("raft engine dropped the response"))?
    }

    pub async fn change_config(&self, change: ConfigChange) -> Result<()> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.tx
            .send(RaftMsg::ChangeConfig { change, tx })
            .await
            .map_err(|_| mesh_common::errors::format_err!("raft engine is no longer running"))?;
        rx.await
            .map_err(|_| mesh_common::errors::format_err!("raft engine dropped the response"))?
    }

    /// Feeds an inbound `AppendEntries` RPC (received over the mesh
    /// transport by component D's RPC dispatch) into the engine.
    pub async fn handle_append_entries(&self, request: AppendEntriesRequest) -> Result<AppendEntriesResponse> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.tx
            .send(RaftMsg::AppendEntries { request, tx })
            .await
            .map_err(|_| mesh_common::errors::format_err!("raft engine is no longer running"))?;
        rx.await.map_err(|_| mesh_common::errors::format_err!("raft engine dropped the response"))
    }

    /// Feeds an inbound pre-vote poll (spec.md §4.C) into the engine. Never
    /// mutates `current_term`/`voted_for`.
    pub async fn handle_pre_vote(&self, request: PreVoteRequest) -> Result<PreVoteResponse> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.tx
            .send(RaftMsg::PreVote { request, tx })
            .await
            .map_err(|_| mesh_common::errors::format_err!("raft engine is no longer running"))?;
        rx.await.map_err(|_| mesh_common::errors::format_err!("raft engine dropped the response"))
    }

    pub async fn handle_request_vote(&self, request: RequestVoteRequest) -> Result<RequestVoteResponse> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.tx
            .send(RaftMsg::RequestVote { request, tx })
            .await
            .map_err(|_| mesh_common::errors::format_err!("raft engine is no longer running"))?;
        rx.await.map_err(|_| mesh_common::errors::format_err!("raft engine dropped the response"))
    }

    pub async fn handle_install_snapshot(
        &self,
        request: InstallSnapshotRequest,
    ) -> Result<InstallSnapshotResponse> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.tx
            .send(RaftMsg::InstallSnapshot { request, tx })
            .await
            .map_err(|_| mesh_common::errors::format_err!("raft engine is no longer running"))?;
        rx.await.map_err(|_| mesh_common::errors::format_err!("raft engine dropped the response"))
    }
}
