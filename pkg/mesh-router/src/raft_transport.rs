//! Carries component C's Raft RPCs over the mesh's real links as CONTROL
//! frames, using the wire format's `correlation_id` field for request/
//! response matching (spec.md §6) the same way `mesh-raft`'s `RaftHandle`
//! matches calls to replies over a local channel with `futures::oneshot`.
//!
//! One `RaftLinkBridge` is shared by every consensus group on a node (MCG
//! plus every open stream's DSG); `GroupRaftTransport` is the thin,
//! per-group facade the engine actually holds as its `RaftTransport`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_std::sync::{Mutex, RwLock};
use futures::channel::oneshot;

use mesh_common::errors::{format_err, Result};
use mesh_common::ids::{GroupId, NodeId};
use mesh_raft::handle::RaftHandle;
use mesh_raft::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    PreVoteRequest, PreVoteResponse, RequestVoteRequest, RequestVoteResponse,
};
use mesh_raft::transport::RaftTransport;
use mesh_transport::frame::{Frame, FrameHeader, FrameType};

use crate::table::Router;

#[derive(Clone, serde::Serialize, serde::Deserialize)]
enum Body {
    AppendEntriesReq(AppendEntriesRequest),
    AppendEntriesResp(AppendEntriesResponse),
    PreVoteReq(PreVoteRequest),
    PreVoteResp(PreVoteResponse),
    RequestVoteReq(RequestVoteRequest),
    RequestVoteResp(RequestVoteResponse),
    InstallSnapshotReq(InstallSnapshotRequest),
    InstallSnapshotResp(InstallSnapshotResponse),
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
struct Envelope {
    group_id: GroupId,
    correlation_id: u64,
    body: Body,
}

pub struct RaftLinkBridge {
    local_node: NodeId,
    router: Router,
    next_correlation: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Body>>>,
    groups: RwLock<HashMap<GroupId, RaftHandle>>,
}

impl RaftLinkBridge {
    pub fn new(local_node: NodeId, router: Router) -> Arc<Self> {
        Arc::new(Self {
            local_node,
            router,
            next_correlation: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        })
    }

    pub async fn register_group(&self, group_id: GroupId, handle: RaftHandle) {
        self.groups.write().await.insert(group_id, handle);
    }

    pub async fn unregister_group(&self, group_id: GroupId) {
        self.groups.write().await.remove(&group_id);
    }

    pub fn for_group(self: &Arc<Self>, group_id: GroupId) -> GroupRaftTransport {
        GroupRaftTransport {
            bridge: self.clone(),
            group_id,
        }
    }

    async fn call(&self, group_id: GroupId, target: NodeId, request: Body) -> Result<Body> {
        let correlation_id = self.next_correlation.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(correlation_id, tx);

        let envelope = Envelope {
            group_id,
            correlation_id,
            body: request,
        };
        let payload = bincode::serialize(&envelope).map_err(|e| format_err!("encode raft rpc: {}", e))?;
        self.router
            .send_unicast(
                target,
                Frame {
                    frame_type: FrameType::Control,
                    header: FrameHeader {
                        from_node: Some(self.local_node),
                        to_node: Some(target),
                        correlation_id: Some(correlation_id),
                        ..Default::default()
                    },
                    payload,
                },
            )
            .await?;

        rx.await
            .map_err(|_| format_err!("raft rpc to {} timed out or the node shut down", target))
    }

    /// Feeds an inbound CONTROL frame carrying a Raft RPC envelope. Called
    /// from the node's link-receive loop for every CONTROL frame whose
    /// payload doesn't belong to another control protocol.
    pub async fn dispatch_inbound(&self, from: NodeId, frame: &Frame) -> Result<()> {
        let envelope: Envelope =
            bincode::deserialize(&frame.payload).map_err(|e| format_err!("decode raft rpc: {}", e))?;

        match envelope.body {
            Body::AppendEntriesResp(_)
            | Body::PreVoteResp(_)
            | Body::RequestVoteResp(_)
            | Body::InstallSnapshotResp(_) => {
                if let Some(tx) = self.pending.lock().await.remove(&envelope.correlation_id) {
                    let _ = tx.send(envelope.body);
                }
                Ok(())
            }
            request => {
                let handle = self
                    .groups
                    .read()
                    .await
                    .get(&envelope.group_id)
                    .cloned()
                    .ok_or_else(|| format_err!("no such consensus group {:?} on this node", envelope.group_id))?;

                let response = match request {
                    Body::AppendEntriesReq(r) => Body::AppendEntriesResp(handle.handle_append_entries(r).await?),
                    Body::PreVoteReq(r) => Body::PreVoteResp(handle.handle_pre_vote(r).await?),
                    Body::RequestVoteReq(r) => Body::RequestVoteResp(handle.handle_request_vote(r).await?),
                    Body::InstallSnapshotReq(r) => {
                        Body::InstallSnapshotResp(handle.handle_install_snapshot(r).await?)
                    }
                    _ => unreachable!("response variants handled above"),
                };

                let reply = Envelope {
                    group_id: envelope.group_id,
                    correlation_id: envelope.correlation_id,
                    body: response,
                };
                let payload = bincode::serialize(&reply).map_err(|e| format_err!("encode raft rpc reply: {}", e))?;
                self.router
                    .send_unicast(
                        from,
                        Frame {
                            frame_type: FrameType::Control,
                            header: FrameHeader {
                                from_node: Some(self.local_node),
                                to_node: Some(from),
                                correlation_id: Some(envelope.correlation_id),
                                ..Default::default()
                            },
                            payload,
                        },
                    )
                    .await
            }
        }
    }
}

/// `RaftHandle` needs to be `Clone`, which it already is (spec.md §4.C).
#[derive(Clone)]
pub struct GroupRaftTransport {
    bridge: Arc<RaftLinkBridge>,
    group_id: GroupId,
}

#[async_trait::async_trait]
impl RaftTransport for GroupRaftTransport {
    async fn append_entries(&self, target: NodeId, request: AppendEntriesRequest) -> Result<AppendEntriesResponse> {
        match self
            .bridge
            .call(self.group_id, target, Body::AppendEntriesReq(request))
            .await?
        {
            Body::AppendEntriesResp(r) => Ok(r),
            _ => Err(format_err!("mismatched raft rpc response type")),
        }
    }

    async fn pre_vote(&self, target: NodeId, request: PreVoteRequest) -> Result<PreVoteResponse> {
        match self.bridge.call(self.group_id, target, Body::PreVoteReq(request)).await? {
            Body::PreVoteResp(r) => Ok(r),
            _ => Err(format_err!("mismatched raft rpc response type")),
        }
    }

    async fn request_vote(&self, target: NodeId, request: RequestVoteRequest) -> Result<RequestVoteResponse> {
        match self
            .bridge
            .call(self.group_id, target, Body::RequestVoteReq(request))
            .await?
        {
            Body::RequestVoteResp(r) => Ok(r),
            _ => Err(format_err!("mismatched raft rpc response type")),
        }
    }

    async fn install_snapshot(
        &self,
        target: NodeId,
        request: InstallSnapshotRequest,
    ) -> Result<InstallSnapshotResponse> {
        match self
            .bridge
            .call(self.group_id, target, Body::InstallSnapshotReq(request))
            .await?
        {
            Body::InstallSnapshotResp(r) => Ok(r),
            _ => Err(format_err!("mismatched raft rpc response type")),
        }
    }
}
