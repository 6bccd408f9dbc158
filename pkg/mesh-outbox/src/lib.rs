//! Component E: Outbox & Delivery (spec.md §4.E). Bridges "DSG committed"
//! to "destination acknowledged": durable, idempotent, at-least-once
//! transport underneath exactly-once subscriber delivery.

pub mod dispatcher;
pub mod entry;
pub mod store;

pub use dispatcher::{DispatchOutcome, OutboxDispatcher, PayloadDispatch, RetryPolicy};
pub use entry::{OutboxEntry, OutboxState, PayloadRef};
pub use store::{MemOutboxStore, OutboxStore};
