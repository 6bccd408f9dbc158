//! The application hook invoked as committed entries advance (spec.md §4.C).
//! MCG's state machine folds membership/link/config entries into the
//! topology component; DSG's folds chunk/stream-config entries into the
//! outbox.

use mesh_common::errors::Result;

use crate::types::LogEntry;

#[async_trait::async_trait]
pub trait StateMachine: Send + Sync + 'static {
    async fn apply(&self, entry: &LogEntry) -> Result<()>;

    /// Serializes enough state to let `restore` reconstruct it, used when the
    /// log is compacted into a snapshot.
    async fn snapshot(&self) -> Result<Vec<u8>>;

    async fn restore(&self, data: &[u8]) -> Result<()>;
}
