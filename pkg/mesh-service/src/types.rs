//! Request/response shapes for the node RPC surface (spec.md §6). The
//! surface itself is transport-agnostic per the spec; `mesh-node`'s binary
//! is the one place that would bind these to an actual RPC transport
//! (this crate stops at the typed Rust API).

use mesh_common::ids::{GroupId, MeshId, NodeId, StreamId};
use mesh_common::model::{NodeStatus, Qos};

#[derive(Clone, Debug)]
pub struct MeshStatus {
    pub mesh_id: MeshId,
    pub local_node: NodeId,
    pub members: Vec<NodeId>,
    pub local_status: NodeStatus,
}

#[derive(Clone, Debug)]
pub struct TopologyStatus {
    pub live_links: Vec<(NodeId, NodeId)>,
}

#[derive(Clone, Debug)]
pub struct StreamHandle {
    pub stream_id: StreamId,
    pub group_id: GroupId,
}

#[derive(Clone, Debug)]
pub struct PublishResult {
    pub seq: u64,
    pub durable: bool,
}

#[derive(Clone, Debug)]
pub struct OpenStreamRequest {
    pub tenant_id: String,
    pub target_nodes: Vec<NodeId>,
    pub qos: Qos,
    pub priority: u8,
}

#[derive(Clone, Debug)]
pub enum MeshEvent {
    NodeJoined(NodeId),
    NodeEvicted(NodeId),
    LinkUp(NodeId, NodeId),
    LinkDown(NodeId, NodeId),
    StreamFailed { stream_id: StreamId, target: NodeId },
}
