//! Link-State Advertisements (spec.md §3, §4.B): an origin-signed snapshot of
//! a node's local link view, flooded to build the LSDB.

use mesh_common::ids::NodeId;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct NeighborMeasurement {
    pub neighbor: NodeId,
    pub latency_ms: f64,
    pub loss_bp: f64,
    pub utilization: f64,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Lsa {
    pub origin_node: NodeId,
    /// Monotonically increasing per-origin version (spec.md §3 invariant:
    /// "a newer LSA from the same origin strictly replaces an older one").
    pub sequence: u64,
    pub neighbors: Vec<NeighborMeasurement>,
    pub signature: Vec<u8>,
}

impl Lsa {
    /// Whether `self` should replace `existing` in the LSDB.
    pub fn supersedes(&self, existing: Option<&Lsa>) -> bool {
        match existing {
            None => true,
            Some(existing) => self.sequence > existing.sequence,
        }
    }
}
