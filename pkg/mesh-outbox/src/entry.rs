//! `OutboxEntry` and its state machine (spec.md §3, §4.E, §6 `mesh_outbox`
//! table).

use mesh_common::ids::{NodeId, StreamId};
use mesh_common::model::Qos;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutboxState {
    Pending,
    InFlight,
    Acked,
    FailedPermanent,
}

#[derive(Clone, Debug)]
pub struct OutboxEntry {
    pub stream_id: StreamId,
    pub seq: u64,
    pub destination_node: NodeId,
    pub qos: Qos,
    pub state: OutboxState,
    pub attempts: u32,
    pub next_retry_at_millis: u64,
    /// A handle to the payload (spec.md §6: `payload_ref`) rather than the
    /// bytes themselves — the chunk's durable copy lives in the DSG's log,
    /// this just has to find it again.
    pub payload_ref: PayloadRef,
    pub created_at_millis: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadRef {
    pub stream_id: StreamId,
    pub log_index: u64,
}

impl OutboxEntry {
    pub fn new(
        stream_id: StreamId,
        seq: u64,
        destination_node: NodeId,
        qos: Qos,
        payload_ref: PayloadRef,
        created_at_millis: u64,
    ) -> Self {
        Self {
            stream_id,
            seq,
            destination_node,
            qos,
            state: OutboxState::Pending,
            attempts: 0,
            next_retry_at_millis: created_at_millis,
            payload_ref,
            created_at_millis,
        }
    }

    pub fn key(&self) -> (StreamId, u64, NodeId) {
        (self.stream_id, self.seq, self.destination_node)
    }
}
