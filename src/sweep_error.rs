//! SweepError: unified error type for sn-sweep public APIs
//!
//! Every fallible operation in the crate returns this type. Configuration and
//! topology problems are detected before any sweep executes; protocol
//! violations abort the sweep that observed them.

use crate::topology::cell::CellId;
use thiserror::Error;

/// Unified error type for sweep construction and execution.
#[derive(Debug, Error)]
pub enum SweepError {
    /// A face references a boundary id with no assigned condition.
    #[error("cell {cell} face {face}: boundary id {boundary_id} has no assigned condition")]
    UnassignedBoundary {
        cell: CellId,
        face: usize,
        boundary_id: u64,
    },
    /// A reflecting (or mirror-coupled) face has no mirrored direction in the quadrature.
    #[error("cell {cell} face {face}: no mirrored direction for direction {direction}")]
    MissingMirror {
        cell: CellId,
        face: usize,
        direction: usize,
    },
    /// A cell references a material that the problem does not define.
    #[error("cell {cell}: unknown material {material}")]
    UnknownMaterial { cell: CellId, material: u32 },
    /// Per-group data has the wrong number of entries.
    #[error("{what}: expected {expected} groups, got {got}")]
    GroupCountMismatch {
        what: String,
        expected: usize,
        got: usize,
    },
    /// A direction is not a finite unit vector or has a non-positive weight.
    #[error("invalid direction: {0}")]
    InvalidDirection(String),
    /// The partitioned mesh is structurally inconsistent.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
    /// A configuration value is out of range.
    #[error("invalid sweep configuration: {0}")]
    InvalidConfig(String),
    /// The local dependency graph of an angle set contains a cycle.
    #[error("angle set {angle_set}: cyclic local dependencies, {unresolved} cells unresolved")]
    LocalCycle { angle_set: usize, unresolved: usize },
    /// Dependencies of an angle set form a cycle that crosses partitions.
    #[error("angle set {angle_set}: cyclic dependencies across partitions, {unresolved} interface cells unresolved")]
    PartitionCycle { angle_set: usize, unresolved: usize },
    /// A neighbour delivered a different number of flux values than agreed.
    #[error(
        "angle set {angle_set}: rank {neighbor} sent {got} flux values, expected {expected}"
    )]
    BufferLengthMismatch {
        neighbor: usize,
        angle_set: usize,
        expected: usize,
        got: usize,
    },
    /// A flux chunk arrived for an unexpected angle set or offset.
    #[error(
        "angle set {angle_set}: rank {neighbor} chunk at offset {offset}, expected {expected_offset}"
    )]
    ChunkOutOfOrder {
        neighbor: usize,
        angle_set: usize,
        offset: usize,
        expected_offset: usize,
    },
    /// Transport-level failure talking to a neighbour.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The scheduler made no progress within the idle-poll budget.
    #[error("angle set {angle_set} on rank {rank}: no progress after {polls} polls")]
    Stalled {
        angle_set: usize,
        rank: usize,
        polls: u64,
    },
    /// The per-cell kernel rejected its input.
    #[error("kernel failed on cell {cell}: {message}")]
    Kernel { cell: CellId, message: String },
}
