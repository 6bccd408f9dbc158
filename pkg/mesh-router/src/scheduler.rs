//! Per-stream scheduler (spec.md §4.D): on DSG commit, stripes a chunk
//! across up to N paths per target by `seq mod N`, while tracking the
//! credit window that backpressures further dispatch.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use mesh_common::errors::Result;
use mesh_common::ids::{NodeId, StreamId};
use mesh_common::model::Chunk;
use mesh_topology::paths::Path;
use mesh_transport::frame::{Frame, FrameHeader, FrameType};

use crate::table::Router;

/// One target's dispatch state for one stream: its striping path set and
/// its credit window (spec.md §4.D: "each (stream, target) has a credit
/// window").
pub struct TargetState {
    target: NodeId,
    paths: Vec<Path>,
    credit: AtomicI64,
}

impl TargetState {
    pub fn new(target: NodeId, paths: Vec<Path>, credit_window_chunks: u64) -> Self {
        Self {
            target,
            paths,
            credit: AtomicI64::new(credit_window_chunks as i64),
        }
    }

    pub fn has_credit(&self) -> bool {
        self.credit.load(Ordering::SeqCst) > 0
    }

    /// Applies a `CHUNK_ACK` (spec.md §4.D: "the sender increments the
    /// credit by one per ack").
    pub fn grant_credit(&self) {
        self.credit.fetch_add(1, Ordering::SeqCst);
    }

    fn path_for_seq(&self, seq: u64) -> Option<&Path> {
        if self.paths.is_empty() {
            return None;
        }
        let n = self.paths.len() as u64;
        self.paths.get((seq % n) as usize)
    }
}

pub struct StreamScheduler {
    stream_id: StreamId,
    router: Router,
    paths_per_target: usize,
}

impl StreamScheduler {
    pub fn new(stream_id: StreamId, router: Router, paths_per_target: usize) -> Self {
        Self {
            stream_id,
            router,
            paths_per_target,
        }
    }

    /// Builds the striping path set for one target: up to `paths_per_target`
    /// of B's candidate paths (spec.md §4.D default N=2).
    pub async fn target_state(&self, target: NodeId, credit_window_chunks: u64, topology: &mesh_topology::Topology) -> TargetState {
        let mut paths = topology.paths_to(target).await;
        paths.truncate(self.paths_per_target);
        TargetState::new(target, paths, credit_window_chunks)
    }

    /// Dispatches one committed chunk to one target, striping by
    /// `seq mod N` across that target's path set (spec.md §4.D step 3). The
    /// caller is responsible for checking `has_credit()` first and leaving
    /// the entry `pending` if it returns `unavailable` (spec.md §4.D step 4).
    pub async fn dispatch(&self, state: &TargetState, chunk: &Chunk) -> Result<()> {
        let path = state
            .path_for_seq(chunk.seq)
            .ok_or_else(|| mesh_common::errors::format_err!("no path available to {}", state.target))?;

        state.credit.fetch_sub(1, Ordering::SeqCst);

        let frame = Frame {
            frame_type: FrameType::Data,
            header: FrameHeader {
                from_node: Some(chunk.origin_node),
                to_node: Some(state.target),
                stream_id: Some(self.stream_id),
                seq: Some(chunk.seq),
                correlation_id: None,
                auth_tag: None,
            },
            payload: chunk.payload_ciphertext.clone(),
        };

        if let Err(e) = self.router.send_via_path(path, frame).await {
            state.credit.fetch_add(1, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }
}

/// Builds the `CHUNK_ACK` control frame a destination sends back to the
/// origin after delivering a chunk to its subscriber (spec.md §4.D).
pub fn chunk_ack_frame(local_node: NodeId, stream_id: StreamId, origin: NodeId, seq: u64) -> Frame {
    Frame {
        frame_type: FrameType::Control,
        header: FrameHeader {
            from_node: Some(local_node),
            to_node: Some(origin),
            stream_id: Some(stream_id),
            seq: Some(seq),
            correlation_id: None,
            auth_tag: None,
        },
        payload: vec![],
    }
}

pub type SharedTargetState = Arc<TargetState>;
