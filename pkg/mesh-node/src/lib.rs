//! The node process crate: wires every other `mesh-*` component into one
//! running process (spec.md §9's composition-root supplement). Split into a
//! library so `composition::run` and `config_file::load` stay testable
//! without going through the `main.rs` binary entry point.

pub mod composition;
pub mod config_file;

pub use composition::{run, Bootstrap};
