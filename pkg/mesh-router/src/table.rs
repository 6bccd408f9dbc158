//! Unicast best-path selection and broadcast flood (spec.md §4.D): "For
//! unicast control traffic the router selects the best currently-available
//! path (first K=1)... For broadcast traffic, the router uses the gossip
//! rules of B (flood, no-reverse)."

use mesh_common::errors::{format_err, Result};
use mesh_common::ids::NodeId;
use mesh_topology::Topology;
use mesh_transport::frame::Frame;

use crate::links::LinkTable;

#[derive(Clone)]
pub struct Router {
    local_node: NodeId,
    topology: Topology,
    links: LinkTable,
}

impl Router {
    pub fn new(local_node: NodeId, topology: Topology, links: LinkTable) -> Self {
        Self {
            local_node,
            topology,
            links,
        }
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Resolves the next hop toward `dest` using B's best (first) path and
    /// sends `frame` over that neighbor's link.
    pub async fn send_unicast(&self, dest: NodeId, frame: Frame) -> Result<()> {
        if dest == self.local_node {
            return Err(format_err!("refusing to route a frame to the local node"));
        }
        let paths = self.topology.paths_to(dest).await;
        let best = paths.first().ok_or_else(|| format_err!("no path to {}", dest))?;
        let next_hop = *best
            .nodes
            .get(1)
            .ok_or_else(|| format_err!("degenerate path to {} has no next hop", dest))?;
        let link = self.links.get(next_hop).await?;
        link.send(frame).await?;
        Ok(())
    }

    /// Sends `frame` over a specific, already-chosen path's next hop, for the
    /// scheduler's striping decisions (spec.md §4.D step 3).
    pub async fn send_via_path(&self, path: &mesh_topology::paths::Path, frame: Frame) -> Result<()> {
        let next_hop = *path
            .nodes
            .get(1)
            .ok_or_else(|| format_err!("degenerate path has no next hop"))?;
        let link = self.links.get(next_hop).await?;
        link.send(frame).await?;
        Ok(())
    }

    /// Floods `frame` to every neighbor except `exclude` (the one it arrived
    /// from, for reverse-path-forwarding broadcast — spec.md §4.B/§4.D).
    pub async fn broadcast(&self, frame: Frame, exclude: Option<NodeId>) {
        for link in self.links.all_links().await {
            let peer = link.peer().await;
            if Some(peer) == exclude {
                continue;
            }
            let _ = link.send(frame.clone()).await;
        }
    }
}
