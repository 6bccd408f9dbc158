//! The outbound RPC seam (spec.md §4.C): the engine never touches a `Link`
//! directly — component D (router) implements this trait over the mesh's
//! actual framed transport, keeping consensus transport-agnostic the same
//! way the teacher's `raft` crate takes an injected RPC client.

use mesh_common::errors::Result;
use mesh_common::ids::NodeId;

use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    PreVoteRequest, PreVoteResponse, RequestVoteRequest, RequestVoteResponse,
};

#[async_trait::async_trait]
pub trait RaftTransport: Send + Sync + 'static {
    async fn append_entries(
        &self,
        target: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse>;

    async fn pre_vote(&self, target: NodeId, request: PreVoteRequest) -> Result<PreVoteResponse>;

    async fn request_vote(
        &self,
        target: NodeId,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse>;

    async fn install_snapshot(
        &self,
        target: NodeId,
        request: InstallSnapshotRequest,
    ) -> Result<InstallSnapshotResponse>;
}
