//! Receiver-side duplicate suppression (spec.md §4.D): "the receiver tracks
//! a sliding window of `(stream_id, seq)` it has applied; duplicates... are
//! acked but not delivered twice." Window size is
//! `max(credit_window × 4, 2048)`.

use std::collections::{BTreeSet, HashMap};

use async_std::sync::Mutex;

#[derive(Default)]
struct PerTarget {
    applied: BTreeSet<u64>,
    low_water: u64,
}

/// One dedup window per stream this (local) node is a destination for —
/// `(stream_id, seq)` per spec.md §4.D, the local node's identity as the
/// destination being implicit. `mark_and_check` is the single entry point:
/// it reports whether `seq` is new (and records it) in one atomic step,
/// avoiding a check-then-insert race between concurrent reorder-buffer
/// deliveries arriving over different striped paths.
pub struct DedupWindow {
    window_size: u64,
    per_stream: Mutex<HashMap<mesh_common::ids::StreamId, PerTarget>>,
}

impl DedupWindow {
    pub fn new(credit_window_chunks: u64) -> Self {
        Self {
            window_size: (credit_window_chunks * 4).max(2048),
            per_stream: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `seq` had not already been applied for `stream`,
    /// recording it as applied either way so a concurrent duplicate sees
    /// `false`.
    pub async fn mark_and_check(&self, stream: mesh_common::ids::StreamId, seq: u64) -> bool {
        let mut guard = self.per_stream.lock().await;
        let entry = guard.entry(stream).or_default();

        if seq < entry.low_water || entry.applied.contains(&seq) {
            return false;
        }
        entry.applied.insert(seq);

        // Slide the window forward once it grows past capacity, dropping the
        // oldest recorded seqs; they're unreachable again anyway since
        // `low_water` now rejects them outright.
        while entry.applied.len() as u64 > self.window_size {
            if let Some(&oldest) = entry.applied.iter().next() {
                entry.applied.remove(&oldest);
                entry.low_water = entry.low_water.max(oldest + 1);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_common::ids::StreamId;

    #[async_std::test]
    async fn second_application_of_same_seq_is_rejected() {
        let window = DedupWindow::new(512);
        let stream = StreamId::random();
        assert!(window.mark_and_check(stream, 5).await);
        assert!(!window.mark_and_check(stream, 5).await);
        assert!(window.mark_and_check(stream, 6).await);
    }
}
