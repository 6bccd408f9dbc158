//! Core log and configuration types (spec.md §4.C), grounded on the
//! teacher's own raft protocol shapes (`pkg/raft/src/protos`).

use std::collections::HashSet;

use mesh_common::ids::NodeId;

pub type Term = u64;
pub type LogIndex = u64;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConfigChange {
    AddMember(NodeId),
    AddLearner(NodeId),
    RemoveServer(NodeId),
}

/// A group's voting membership. Learners receive the log but don't count
/// toward quorum (spec.md §4.C: "single in-flight config change", "joint
/// -consensus-style single-server add/remove").
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Configuration {
    pub members: HashSet<NodeId>,
    pub learners: HashSet<NodeId>,
}

impl Configuration {
    pub fn apply(&mut self, change: &ConfigChange) {
        match change {
            ConfigChange::AddMember(id) => {
                self.learners.remove(id);
                self.members.insert(*id);
            }
            ConfigChange::AddLearner(id) => {
                if !self.members.contains(id) {
                    self.learners.insert(*id);
                }
            }
            ConfigChange::RemoveServer(id) => {
                self.members.remove(id);
                self.learners.remove(id);
            }
        }
    }

    pub fn quorum_size(&self) -> usize {
        self.members.len() / 2 + 1
    }
}

/// A single replicated log entry. `Command` payloads are opaque to the
/// engine; `mesh-raft`'s `McgEntry`/`DsgEntry` give them meaning per group
/// kind (spec.md §9: one consolidated engine serving both MCG and DSG).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum LogEntryData {
    Noop,
    Config(ConfigChange),
    Command(Vec<u8>),
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub index: LogIndex,
    pub term: Term,
    pub data: LogEntryData,
}

/// Durable per-group state that must survive a crash (spec.md §4.C):
/// current term, the candidate voted for this term, and the commit index.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Metadata {
    pub current_term: Term,
    pub voted_for: Option<NodeId>,
    pub commit_index: LogIndex,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SnapshotMeta {
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
    pub configuration: Configuration,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub data: Vec<u8>,
}
