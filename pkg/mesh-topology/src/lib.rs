//! Component B: Topology & Paths (spec.md §4.B).
//!
//! Owns the Link-State Database, the per-destination K-shortest-paths cache,
//! and the tasks that keep both current: periodic LSA emission, reverse-path
//! -forwarding flood, and fast-reroute cache invalidation on link failure.

pub mod cache;
pub mod cost;
pub mod gossip;
pub mod lsa;
pub mod lsdb;
pub mod paths;

use std::sync::Arc;

use mesh_common::config::TopologyConfig;
use mesh_common::errors::Result;
use mesh_common::ids::{LinkKey, NodeId};
use mesh_executor::resource_group::ServiceResourceGroup;
use mesh_transport::link::{LinkEvent, LinkState};

pub use cache::PathCache;
pub use gossip::{GossipMessage, LsaBuilder};
pub use lsa::{Lsa, NeighborMeasurement};
pub use lsdb::{ApplyOutcome, Lsdb};
pub use paths::Path;

/// The full topology component for one node.
#[derive(Clone)]
pub struct Topology {
    local_node: NodeId,
    config: TopologyConfig,
    lsdb: Lsdb,
    cache: PathCache,
    builder: Arc<LsaBuilder>,
    outbound_tx: async_std::channel::Sender<GossipMessage>,
}

impl Topology {
    pub fn new(
        local_node: NodeId,
        config: TopologyConfig,
    ) -> (Self, async_std::channel::Receiver<GossipMessage>) {
        let (outbound_tx, outbound_rx) = async_std::channel::unbounded();
        let topology = Self {
            local_node,
            cache: PathCache::new(config.lsa_interval),
            builder: Arc::new(LsaBuilder::new(local_node)),
            config,
            lsdb: Lsdb::new(),
            outbound_tx,
        };
        (topology, outbound_rx)
    }

    pub fn lsdb(&self) -> &Lsdb {
        &self.lsdb
    }

    pub async fn reconcile_membership(&self, members: std::collections::HashSet<NodeId>) {
        self.lsdb.reconcile_membership(members).await;
    }

    /// Returns up to `path_k` candidate routes to `dest`, serving from cache
    /// when fresh (spec.md §4.B).
    pub async fn paths_to(&self, dest: NodeId) -> Vec<Path> {
        if let Some(cached) = self.cache.get(dest).await {
            return cached;
        }
        let snapshot = self.lsdb.snapshot().await;
        let graph = paths::build_graph(&snapshot, &self.config.cost_weights);
        let computed = paths::k_shortest_paths(&graph, self.local_node, dest, self.config.path_k);
        self.cache.put(dest, computed.clone()).await;
        computed
    }

    /// Applies an inbound LSA (either a neighbor's own origination or a
    /// forwarded flood) and, if it was newly accepted, re-floods it to every
    /// neighbor except the one it arrived from.
    pub async fn handle_inbound_lsa(&self, lsa: Lsa, received_from: NodeId) -> ApplyOutcome {
        let outcome = self.lsdb.apply(lsa.clone()).await;
        if outcome == ApplyOutcome::Applied {
            let _ = self
                .outbound_tx
                .send(GossipMessage {
                    lsa,
                    exclude: Some(received_from),
                })
                .await;
        }
        outcome
    }

    /// Folds a transport-level link state change into the local neighbor view
    /// and, on failure, fast-reroutes by invalidating cached paths through it
    /// immediately rather than waiting for the TTL (spec.md §4.B).
    pub async fn handle_link_event(&self, event: LinkEvent) {
        let LinkEvent::StateChanged { peer, state, .. } = event;
        match state {
            LinkState::Up => {
                self.builder
                    .update_neighbor(NeighborMeasurement {
                        neighbor: peer,
                        latency_ms: 0.0,
                        loss_bp: 0.0,
                        utilization: 0.0,
                    })
                    .await;
            }
            LinkState::Down | LinkState::Closed => {
                self.builder.remove_neighbor(peer).await;
                self.cache
                    .invalidate_through_link(LinkKey::new(self.local_node, peer))
                    .await;
            }
            LinkState::Connecting | LinkState::Draining => {}
        }
    }

    /// Records a fresh measurement for a neighbor (spec.md §4.B cost inputs),
    /// typically fed by the transport layer's heartbeat RTT sampling.
    pub async fn record_measurement(&self, measurement: NeighborMeasurement) {
        self.builder.update_neighbor(measurement).await;
    }

    /// Registers the periodic LSA-emission task and the link-event consumer
    /// into `group`, so the composition root supervises both alongside every
    /// other component task (spec.md §9's "capability interfaces" note).
    pub async fn spawn_tasks(
        &self,
        group: &ServiceResourceGroup,
        link_events: async_std::channel::Receiver<LinkEvent>,
    ) {
        let this = self.clone();
        group
            .spawn("topology-lsa-emitter", move |token| async move {
                loop {
                    async_std::task::sleep(this.config.lsa_interval).await;
                    if token.is_cancelled().await {
                        return Ok(());
                    }
                    let lsa = this.builder.build().await;
                    this.lsdb.apply(lsa.clone()).await;
                    let _ = this
                        .outbound_tx
                        .send(GossipMessage { lsa, exclude: None })
                        .await;
                }
            })
            .await;

        let this = self.clone();
        group
            .spawn("topology-link-events", move |token| async move {
                loop {
                    let recv = link_events.recv();
                    let cancelled = token.wait_for_cancellation();
                    match futures::future::select(Box::pin(recv), Box::pin(cancelled)).await {
                        futures::future::Either::Left((Ok(event), _)) => {
                            this.handle_link_event(event).await
                        }
                        futures::future::Either::Left((Err(_), _)) => return Ok(()),
                        futures::future::Either::Right(_) => return Ok(()),
                    }
                }
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_common::config::TopologyConfig;
    use mesh_transport::errors::CloseReason;

    #[async_std::test]
    async fn fast_reroute_invalidates_cache_on_link_down() -> Result<()> {
        let (topology, _rx) = Topology::new(NodeId(1), TopologyConfig::default());
        topology
            .reconcile_membership(std::collections::HashSet::from([
                NodeId(1),
                NodeId(2),
                NodeId(3),
            ]))
            .await;

        topology
            .handle_inbound_lsa(
                Lsa {
                    origin_node: NodeId(1),
                    sequence: 1,
                    neighbors: vec![NeighborMeasurement {
                        neighbor: NodeId(2),
                        latency_ms: 1.0,
                        loss_bp: 0.0,
                        utilization: 0.0,
                    }],
                    signature: vec![],
                },
                NodeId(2),
            )
            .await;
        topology
            .handle_inbound_lsa(
                Lsa {
                    origin_node: NodeId(2),
                    sequence: 1,
                    neighbors: vec![NeighborMeasurement {
                        neighbor: NodeId(3),
                        latency_ms: 1.0,
                        loss_bp: 0.0,
                        utilization: 0.0,
                    }],
                    signature: vec![],
                },
                NodeId(1),
            )
            .await;

        let first = topology.paths_to(NodeId(3)).await;
        assert!(!first.is_empty());

        topology
            .handle_link_event(LinkEvent::StateChanged {
                peer: NodeId(2),
                state: LinkState::Down,
                reason: Some(CloseReason::HeartbeatTimeout),
            })
            .await;

        // The cached path through node 2 must be gone immediately; a fresh
        // (here: empty, since node 2's LSA is still in the LSDB but the local
        // edge measurement was dropped) computation is triggered on next use.
        assert!(topology.cache.get(NodeId(3)).await.is_none());
        Ok(())
    }
}
