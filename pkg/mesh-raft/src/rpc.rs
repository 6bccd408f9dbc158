//! RPC message shapes exchanged between group replicas (spec.md §4.C),
//! grounded on the teacher's `pkg/raft/src/protos` message set.

use mesh_common::ids::NodeId;

use crate::types::{LogEntry, LogIndex, Snapshot, Term};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
    /// Lets the leader jump `next_index` back in one round trip on a log
    /// mismatch, rather than decrementing one entry at a time.
    pub last_log_index: LogIndex,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: NodeId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

/// spec.md §4.C pre-vote: carries the term the candidate *would* campaign
/// under (`current_term + 1`) without actually incrementing it, so a
/// partitioned node polling for votes never forces real term churn on
/// healthy peers.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PreVoteRequest {
    pub term: Term,
    pub candidate_id: NodeId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PreVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct InstallSnapshotRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub snapshot: Snapshot,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct InstallSnapshotResponse {
    pub term: Term,
}

#[derive(Clone, Debug)]
pub struct ProposeRequest {
    pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct ProposeResponse {
    pub term: Term,
    pub index: LogIndex,
}
