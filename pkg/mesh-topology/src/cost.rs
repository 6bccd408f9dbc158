//! Composite link cost (spec.md §4.B): `cost = w_latency * latency_ms +
//! w_loss * loss_bp + w_util * utilization`.

use mesh_common::config::CostWeights;

use crate::lsa::NeighborMeasurement;

pub fn edge_cost(weights: &CostWeights, m: &NeighborMeasurement) -> f64 {
    weights.latency * m.latency_ms + weights.loss * m.loss_bp + weights.utilization * m.utilization
}
