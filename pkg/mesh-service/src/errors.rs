//! Helpers that construct a classified `MeshError` at the RPC boundary
//! (spec.md §7) and carry it as the crate's common `Result` type, the one
//! place in the mesh components where a `MeshErrorCode` is actually chosen.

use mesh_common::errors::{format_err, Error, MeshError, MeshErrorCode};

pub fn precondition(message: &str) -> Error {
    format_err!("{}", MeshError::new(MeshErrorCode::FailedPrecondition, message))
}

pub fn not_found(message: &str) -> Error {
    format_err!("{}", MeshError::new(MeshErrorCode::NotFound, message))
}

pub fn invalid_argument(message: &str) -> Error {
    format_err!("{}", MeshError::new(MeshErrorCode::InvalidArgument, message))
}
