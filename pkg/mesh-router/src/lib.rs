//! Component D: Router & Scheduler (spec.md §4.D).
//!
//! Decides what happens to every inbound or locally originated frame: unicast
//! control traffic goes out the best path's next hop (component B), broadcast
//! traffic floods to every live neighbor, and committed stream chunks are
//! striped across up to N paths per target while preserving origin-side
//! `seq` order. Also carries component C's Raft RPCs over the mesh's actual
//! links, since the wire format's `correlation_id` field exists for exactly
//! this request/response purpose (spec.md §6).

pub mod dedup;
pub mod links;
pub mod raft_transport;
pub mod reorder;
pub mod scheduler;
pub mod table;

pub use dedup::DedupWindow;
pub use links::LinkTable;
pub use raft_transport::{GroupRaftTransport, RaftLinkBridge};
pub use reorder::ReorderBuffer;
pub use scheduler::{StreamScheduler, TargetState};
pub use table::Router;
