//! Per-stream reorder buffer (spec.md §4.D): chunks leave the origin in
//! strict `seq` order but may arrive out of order after striping across
//! paths; this holds early arrivals until the gap closes, then releases a
//! contiguous run in order. Deduplication (`DedupWindow`) happens before a
//! chunk reaches the buffer, so the buffer itself never has to handle a
//! repeated `seq`.

use std::collections::BTreeMap;

use async_std::sync::Mutex;

use mesh_common::model::Chunk;

struct State {
    next_expected: u64,
    pending: BTreeMap<u64, Chunk>,
}

/// Bounded by `reorder_window` (spec.md §6): a gap wider than the window
/// means an upstream entry is presumed lost rather than merely delayed, and
/// is skipped so delivery can keep making progress.
pub struct ReorderBuffer {
    window: u64,
    state: Mutex<State>,
}

impl ReorderBuffer {
    pub fn new(window: u64, first_seq: u64) -> Self {
        Self {
            window,
            state: Mutex::new(State {
                next_expected: first_seq,
                pending: BTreeMap::new(),
            }),
        }
    }

    /// Admits a chunk and returns every chunk now deliverable in order,
    /// which may be empty (still waiting on an earlier seq), one (the
    /// expected arrival), or many (a held run unblocked by this arrival).
    pub async fn admit(&self, chunk: Chunk) -> Vec<Chunk> {
        let mut guard = self.state.lock().await;

        if chunk.seq < guard.next_expected {
            return vec![]; // already delivered; DedupWindow should have caught this earlier
        }
        guard.pending.insert(chunk.seq, chunk);

        // A gap that's grown past the window means the missing seq is
        // presumed lost; skip it so delivery isn't stalled forever.
        if let Some((&lowest, _)) = guard.pending.iter().next() {
            if lowest >= guard.next_expected + self.window {
                guard.next_expected = lowest;
            }
        }

        let mut ready = vec![];
        while let Some(chunk) = { let next = guard.next_expected; guard.pending.remove(&next) } {
            guard.next_expected += 1;
            ready.push(chunk);
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_common::ids::{NodeId, StreamId};

    fn chunk(seq: u64) -> Chunk {
        Chunk {
            stream_id: StreamId(1),
            seq,
            payload_ciphertext: vec![],
            origin_node: NodeId(1),
            published_at: 0,
        }
    }

    #[async_std::test]
    async fn releases_out_of_order_arrivals_once_gap_closes() {
        let buffer = ReorderBuffer::new(2048, 1);
        assert!(buffer.admit(chunk(2)).await.is_empty());
        assert!(buffer.admit(chunk(3)).await.is_empty());
        let released = buffer.admit(chunk(1)).await;
        assert_eq!(released.iter().map(|c| c.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[async_std::test]
    async fn skips_a_gap_wider_than_the_window() {
        let buffer = ReorderBuffer::new(4, 1);
        let released = buffer.admit(chunk(10)).await;
        assert_eq!(released.iter().map(|c| c.seq).collect::<Vec<_>>(), vec![10]);
    }
}
