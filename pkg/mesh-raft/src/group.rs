//! MCG/DSG entry types layered over the generic engine (spec.md §4.C): one
//! consolidated `RaftCore` drives both, distinguished only by which entry
//! enum its `Command` bytes decode as.

use mesh_common::errors::{format_err, Result};
use mesh_common::ids::NodeId;
use mesh_common::model::{Qos, Stream};

use crate::handle::RaftHandle;
use crate::types::ConfigChange;

/// MCG entries (spec.md §4.C): "Accepts entries of types: member_add,
/// member_remove, link_assert, link_withdraw, mesh_config_set."
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum McgEntry {
    MemberAdd(NodeId),
    MemberRemove(NodeId),
    LinkAssert { a: NodeId, b: NodeId },
    LinkWithdraw { a: NodeId, b: NodeId },
    MeshConfigSet { cost_weights_version: u64 },
}

/// DSG entries (spec.md §4.C): "Accepts entries of types: chunk
/// (payload + seq), stream_config (priority/qos), member_add/remove."
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum DsgEntry {
    Chunk {
        seq: u64,
        payload_ciphertext: Vec<u8>,
        origin_node: NodeId,
    },
    StreamConfig {
        priority: u8,
        qos: Qos,
    },
    MemberAdd(NodeId),
    MemberRemove(NodeId),
}

/// A thin, typed facade over `RaftHandle` for one group, encoding/decoding
/// `Command` bytes so callers never see raw bytes (spec.md §9's note on
/// replacing stringly-typed payloads with real types).
#[derive(Clone)]
pub struct McgHandle {
    pub raft: RaftHandle,
}

impl McgHandle {
    pub fn new(raft: RaftHandle) -> Self {
        Self { raft }
    }

    pub async fn propose(&self, entry: McgEntry) -> Result<u64> {
        let bytes = bincode::serialize(&entry).map_err(|e| format_err!("encode mcg entry: {}", e))?;
        let response = self.raft.propose(bytes).await?;
        Ok(response.index)
    }

    pub async fn add_member(&self, node: NodeId) -> Result<()> {
        self.raft.change_config(ConfigChange::AddMember(node)).await?;
        self.propose(McgEntry::MemberAdd(node)).await?;
        Ok(())
    }

    pub async fn remove_member(&self, node: NodeId) -> Result<()> {
        self.raft.change_config(ConfigChange::RemoveServer(node)).await?;
        self.propose(McgEntry::MemberRemove(node)).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct DsgHandle {
    pub raft: RaftHandle,
}

impl DsgHandle {
    pub fn new(raft: RaftHandle) -> Self {
        Self { raft }
    }

    pub async fn propose(&self, entry: DsgEntry) -> Result<u64> {
        let bytes = bincode::serialize(&entry).map_err(|e| format_err!("encode dsg entry: {}", e))?;
        let response = self.raft.propose(bytes).await?;
        Ok(response.index)
    }

    pub async fn publish_chunk(&self, seq: u64, payload_ciphertext: Vec<u8>, origin_node: NodeId) -> Result<u64> {
        self.propose(DsgEntry::Chunk {
            seq,
            payload_ciphertext,
            origin_node,
        })
        .await
    }

    pub async fn set_stream_config(&self, stream: &Stream) -> Result<u64> {
        self.propose(DsgEntry::StreamConfig {
            priority: stream.priority,
            qos: stream.qos,
        })
        .await
    }
}

/// Decodes a `Command` entry's raw bytes back into its typed form. The
/// engine doesn't call this itself (it only carries bytes) — it's invoked
/// from the `StateMachine::apply` implementations in components B/D/E.
pub fn decode_mcg_entry(bytes: &[u8]) -> Result<McgEntry> {
    bincode::deserialize(bytes).map_err(|e| format_err!("decode mcg entry: {}", e))
}

pub fn decode_dsg_entry(bytes: &[u8]) -> Result<DsgEntry> {
    bincode::deserialize(bytes).map_err(|e| format_err!("decode dsg entry: {}", e))
}
