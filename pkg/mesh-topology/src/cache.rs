//! Per-destination path cache (spec.md §4.B): "results cached per destination
//! with TTL equal to `lsa_interval`"; invalidated immediately on fast reroute
//! rather than waiting out the TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_std::sync::RwLock;

use mesh_common::ids::{LinkKey, NodeId};

use crate::paths::Path;

struct Entry {
    paths: Vec<Path>,
    computed_at: Instant,
}

#[derive(Clone)]
pub struct PathCache {
    inner: Arc<RwLock<HashMap<NodeId, Entry>>>,
    ttl: Duration,
}

impl PathCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the cached K-shortest-paths for `dest` if present and not
    /// expired.
    pub async fn get(&self, dest: NodeId) -> Option<Vec<Path>> {
        let inner = self.inner.read().await;
        let entry = inner.get(&dest)?;
        if entry.computed_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.paths.clone())
    }

    pub async fn put(&self, dest: NodeId, paths: Vec<Path>) {
        self.inner.write().await.insert(
            dest,
            Entry {
                paths,
                computed_at: Instant::now(),
            },
        );
    }

    /// Drops every cached destination whose path set traverses `link`
    /// (spec.md §4.B: "every cached path traversing it is invalidated
    /// immediately; the next data frame to that destination triggers a fresh
    /// computation").
    pub async fn invalidate_through_link(&self, link: LinkKey) {
        let mut inner = self.inner.write().await;
        inner.retain(|_, entry| !entry.paths.iter().any(|p| p.links().contains(&link)));
    }

    pub async fn invalidate_all(&self) {
        self.inner.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(nodes: &[u128]) -> Path {
        Path {
            nodes: nodes.iter().map(|n| NodeId(*n)).collect(),
            cost: 1.0,
        }
    }

    #[async_std::test]
    async fn expires_after_ttl() {
        let cache = PathCache::new(Duration::from_millis(10));
        cache.put(NodeId(1), vec![path(&[0, 1])]).await;
        assert!(cache.get(NodeId(1)).await.is_some());
        async_std::task::sleep(Duration::from_millis(20)).await;
        assert!(cache.get(NodeId(1)).await.is_none());
    }

    #[async_std::test]
    async fn invalidates_paths_through_failed_link() {
        let cache = PathCache::new(Duration::from_secs(60));
        cache.put(NodeId(2), vec![path(&[0, 1, 2])]).await;
        cache.put(NodeId(3), vec![path(&[0, 3])]).await;

        cache.invalidate_through_link(LinkKey::new(NodeId(1), NodeId(2))).await;

        assert!(cache.get(NodeId(2)).await.is_none());
        assert!(cache.get(NodeId(3)).await.is_some());
    }
}
