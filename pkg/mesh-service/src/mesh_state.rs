//! Shared, mutable mesh-wide state the MCG's `StateMachine` folds commits
//! into: membership and the node directory (spec.md §3 `Node`, §6 `nodes`
//! table). Topology's own LSDB is the link-level source of truth; this is
//! the node-level complement.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_std::sync::RwLock;

use mesh_common::ids::NodeId;
use mesh_common::model::{Node, NodeStatus};
use mesh_topology::Topology;

use crate::types::MeshEvent;

#[derive(Clone)]
pub struct MeshState {
    inner: Arc<RwLock<Inner>>,
    topology: Topology,
    events: async_std::channel::Sender<MeshEvent>,
}

struct Inner {
    nodes: HashMap<NodeId, Node>,
}

impl MeshState {
    pub fn new(topology: Topology, events: async_std::channel::Sender<MeshEvent>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner { nodes: HashMap::new() })),
            topology,
            events,
        }
    }

    pub async fn members(&self) -> Vec<NodeId> {
        self.inner.read().await.nodes.keys().copied().collect()
    }

    pub async fn member_add(&self, node: Node) {
        let id = node.node_id;
        self.inner.write().await.nodes.insert(id, node);
        let members: HashSet<NodeId> = self.inner.read().await.nodes.keys().copied().collect();
        self.topology.reconcile_membership(members).await;
        let _ = self.events.send(MeshEvent::NodeJoined(id)).await;
    }

    pub async fn member_remove(&self, node: NodeId) {
        {
            let mut guard = self.inner.write().await;
            if let Some(entry) = guard.nodes.get_mut(&node) {
                entry.status = NodeStatus::Evicted;
            }
            guard.nodes.remove(&node);
        }
        let members: HashSet<NodeId> = self.inner.read().await.nodes.keys().copied().collect();
        self.topology.reconcile_membership(members).await;
        let _ = self.events.send(MeshEvent::NodeEvicted(node)).await;
    }

    pub async fn is_member(&self, node: NodeId) -> bool {
        self.inner.read().await.nodes.contains_key(&node)
    }
}
