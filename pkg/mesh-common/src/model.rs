//! Entities shared by more than one component (spec.md §3): `Node`, `Link`,
//! `Stream`. Entities owned by a single component (log entries, outbox rows)
//! live in that component's crate instead.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::ids::{LinkKey, MeshId, NodeId, RegionId, StreamId};

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum NodeStatus {
    Clean,
    Joining,
    Active,
    Leaving,
    Evicted,
    Offline,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub mesh_id: MeshId,
    pub region_id: Option<RegionId>,
    pub advertised_endpoint: String,
    pub public_key: Vec<u8>,
    pub status: NodeStatus,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum LinkStatus {
    Down,
    Connecting,
    Up,
    Draining,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Link {
    pub key: LinkKey,
    pub status: LinkStatus,
    pub measured_latency: Duration,
    pub measured_bandwidth_bps: u64,
    pub last_sample_at: u64,
    /// Monotonically increasing LSA version for this link's origin-facing
    /// side; compared per spec.md §3's "Invariant: a newer LSA ... strictly
    /// replaces an older one".
    pub sequence: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum Qos {
    BestEffort,
    Reliable,
    ExactlyOnce,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum StreamStatus {
    Opening,
    Active,
    Draining,
    Closed,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Stream {
    pub stream_id: StreamId,
    pub tenant_id: String,
    pub target_nodes: Vec<NodeId>,
    pub qos: Qos,
    pub priority: u8,
    pub committed_seq: u64,
    pub delivered_seq_per_target: BTreeMap<NodeId, u64>,
    pub created_at: u64,
    pub status: StreamStatus,
}

impl Stream {
    /// spec.md §3 Invariant: "for a closed stream, delivered_seq_per_target[t]
    /// >= committed_seq for every t in target_nodes with qos in {reliable,
    /// exactly-once}".
    pub fn fully_delivered(&self) -> bool {
        if self.qos == Qos::BestEffort {
            return true;
        }
        self.target_nodes.iter().all(|t| {
            self.delivered_seq_per_target
                .get(t)
                .copied()
                .unwrap_or(0)
                >= self.committed_seq
        })
    }
}

/// One unit of client payload (spec.md §3 `Chunk`). The ciphertext is opaque
/// to every component in the core (spec.md §1 Non-goals).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Chunk {
    pub stream_id: StreamId,
    pub seq: u64,
    pub payload_ciphertext: Vec<u8>,
    pub origin_node: NodeId,
    pub published_at: u64,
}

/// Idempotency record for exactly-once delivery dedup (spec.md §3
/// `DeliveryReceipt`).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DeliveryReceipt {
    pub stream_id: StreamId,
    pub seq: u64,
    pub destination_node: NodeId,
    pub received_at: u64,
    pub applied_at: Option<u64>,
}
