//! Partitioned mesh topology: cells, faces, ownership and generators.

pub mod cell;
pub mod mesh;
pub mod meshgen;

pub use cell::{Cell, CellId, Face, FaceNeighbor};
pub use mesh::PartitionedMesh;
