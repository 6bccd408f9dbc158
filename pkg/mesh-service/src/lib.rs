//! Component F: Mesh Service API (spec.md §6) — the node's external RPC
//! surface, composing every other component (topology, consensus, router,
//! outbox) behind one typed interface.

pub mod dispatch;
pub mod errors;
pub mod mesh;
pub mod mesh_state;
pub mod state_machine;
pub mod types;

pub use mesh::MeshService;
pub use mesh_state::MeshState;
