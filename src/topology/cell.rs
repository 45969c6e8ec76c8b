//! Cells and faces of a partitioned unstructured mesh.
//!
//! These records are immutable during a sweep. Face classification
//! (local / remote / boundary / reflecting, incoming / outgoing) depends on the
//! sweep direction and lives in [`crate::sweep::graph`], not here.

use std::fmt;

/// Global cell identifier, unique across all partitions.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct CellId(u64);

impl CellId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        CellId(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CellId").field(&self.0).finish()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CellId {
    fn from(raw: u64) -> Self {
        CellId(raw)
    }
}

pub type Vec3 = [f64; 3];

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

/// What lies on the other side of a face.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FaceNeighbor {
    /// Another cell, on this or another partition.
    Cell(CellId),
    /// A domain boundary, tagged with its boundary id.
    Boundary(u64),
}

/// One face of a cell.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Face {
    /// Outward unit normal.
    pub normal: Vec3,
    pub area: f64,
    pub neighbor: FaceNeighbor,
}

impl Face {
    pub fn interior(normal: Vec3, area: f64, neighbor: CellId) -> Self {
        Self {
            normal,
            area,
            neighbor: FaceNeighbor::Cell(neighbor),
        }
    }

    pub fn boundary(normal: Vec3, area: f64, boundary_id: u64) -> Self {
        Self {
            normal,
            area,
            neighbor: FaceNeighbor::Boundary(boundary_id),
        }
    }

    pub fn neighbor_cell(&self) -> Option<CellId> {
        match self.neighbor {
            FaceNeighbor::Cell(c) => Some(c),
            FaceNeighbor::Boundary(_) => None,
        }
    }
}

/// A mesh cell with its ordered faces.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub centroid: Vec3,
    pub volume: f64,
    pub material: u32,
    pub faces: Vec<Face>,
    /// Owning partition rank.
    pub rank: usize,
}
