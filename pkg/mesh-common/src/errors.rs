//! Core error type used across every mesh component.
//!
//! Mirrors the teacher's `common::errors` module: a single `failure::Error`
//! carried as the error side of every `Result`, plus the closed taxonomy from
//! spec.md §7 layered on top so that RPC boundaries can report a stable code.

pub use failure::{err_msg, format_err, Error};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The closed error-code enumeration exposed on the external RPC surface
/// (spec.md §6/§7). Internal errors are richer (`failure::Error` messages);
/// this is the tagged, stable subset a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshErrorCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    FailedPrecondition,
    Aborted,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl MeshErrorCode {
    /// Whether the caller may usefully retry the same request unmodified.
    pub fn retryable(&self) -> bool {
        matches!(self, MeshErrorCode::Aborted | MeshErrorCode::Unavailable)
    }
}

/// A classified failure returned across the RPC boundary (component F).
///
/// Every other component raises plain `mesh_common::errors::Error` internally;
/// this wrapper is constructed only at the edge where a `(code, message,
/// retryable, retry_after_hint)` tuple must be produced (spec.md §7).
#[derive(Debug, Clone)]
pub struct MeshError {
    pub code: MeshErrorCode,
    pub message: String,
    pub retry_after: Option<std::time::Duration>,
}

impl MeshError {
    pub fn new(code: MeshErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, d: std::time::Duration) -> Self {
        self.retry_after = Some(d);
        self
    }

    pub fn retryable(&self) -> bool {
        self.code.retryable()
    }
}

impl std::fmt::Display for MeshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for MeshError {}

/// Internal failure classification (spec.md §7's taxonomy), used by components
/// to decide whether to retry locally, redirect, or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    TransientNetwork,
    PeerState,
    ConsensusPrecondition,
    DurableStore,
    ProtocolAuth,
    ResourceExhaustion,
}

impl FailureKind {
    /// Maps an internal failure kind onto the external error code it should
    /// surface as, per spec.md §7's propagation policy.
    pub fn to_code(&self) -> MeshErrorCode {
        match self {
            FailureKind::TransientNetwork => MeshErrorCode::Unavailable,
            FailureKind::PeerState => MeshErrorCode::Aborted,
            FailureKind::ConsensusPrecondition => MeshErrorCode::FailedPrecondition,
            FailureKind::DurableStore => MeshErrorCode::Internal,
            FailureKind::ProtocolAuth => MeshErrorCode::PermissionDenied,
            FailureKind::ResourceExhaustion => MeshErrorCode::Unavailable,
        }
    }
}
