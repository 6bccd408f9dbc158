//! Opaque identifiers used throughout the mesh (spec.md §3).
//!
//! `NodeId` is specified as an opaque 128-bit value; we represent it (and the
//! other identifiers that share its shape) as a newtype over `u128` with a
//! hex `Display`, in the same spirit as the teacher's `base_radix` crate
//! renders fixed-width binary values as hex/base64 rather than as raw debug
//! tuples.

use std::fmt;

use rand::RngCore;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub u128);

        impl $name {
            pub fn random() -> Self {
                let mut bytes = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(u128::from_be_bytes(bytes))
            }

            pub fn to_bytes(&self) -> [u8; 16] {
                self.0.to_be_bytes()
            }

            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(u128::from_be_bytes(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for b in self.to_bytes() {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

opaque_id!(NodeId);
opaque_id!(MeshId);
opaque_id!(RegionId);
opaque_id!(StreamId);
opaque_id!(GroupId);
opaque_id!(SnapshotId);

/// A consensus group is either the single mesh-wide `Mcg`, or a `Dsg` scoped
/// to one client stream (spec.md §3 `ConsensusGroup`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub enum GroupKind {
    Mcg,
    Dsg(StreamId),
}

impl GroupKind {
    /// Derives a stable `GroupId` for a given kind so that MCG always maps to
    /// the same group identity within a mesh and a DSG maps 1:1 to its stream.
    pub fn group_id(&self, mesh_id: MeshId) -> GroupId {
        match self {
            GroupKind::Mcg => GroupId(mesh_id.0),
            GroupKind::Dsg(stream_id) => GroupId(stream_id.0),
        }
    }
}

/// An ordered pair `(src, dst)` with `src < dst`, matching the Link invariant
/// in spec.md §3 ("an ordered pair of nodes (a,b) with a<b").
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct LinkKey {
    pub src: NodeId,
    pub dst: NodeId,
}

impl LinkKey {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a.0 <= b.0 {
            LinkKey { src: a, dst: b }
        } else {
            LinkKey { src: b, dst: a }
        }
    }

    /// True if this node owns the link's reconnect responsibility (spec.md §3
    /// Ownership: "Links are owned by the numerically smaller endpoint").
    pub fn owned_by(&self, node: NodeId) -> bool {
        self.src == node
    }

    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.src == node {
            Some(self.dst)
        } else if self.dst == node {
            Some(self.src)
        } else {
            None
        }
    }
}
