//! The set of live links to immediate neighbors, keyed by peer node id. Both
//! the router (next-hop send) and the Raft transport adapter (component C's
//! RPCs) go through this table rather than holding their own link handles.

use std::collections::HashMap;
use std::sync::Arc;

use async_std::sync::RwLock;

use mesh_common::errors::{format_err, Result};
use mesh_common::ids::NodeId;
use mesh_transport::link::Link;

#[derive(Clone, Default)]
pub struct LinkTable {
    inner: Arc<RwLock<HashMap<NodeId, Link>>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, peer: NodeId, link: Link) {
        self.inner.write().await.insert(peer, link);
    }

    pub async fn remove(&self, peer: NodeId) {
        self.inner.write().await.remove(&peer);
    }

    pub async fn get(&self, peer: NodeId) -> Result<Link> {
        self.inner
            .read()
            .await
            .get(&peer)
            .cloned()
            .ok_or_else(|| format_err!("no live link to {}", peer))
    }

    pub async fn neighbors(&self) -> Vec<NodeId> {
        self.inner.read().await.keys().copied().collect()
    }

    pub async fn all_links(&self) -> Vec<Link> {
        self.inner.read().await.values().cloned().collect()
    }
}
