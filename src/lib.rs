#![cfg_attr(docsrs, feature(doc_cfg))]
//! # sn-sweep
//!
//! sn-sweep schedules discrete-ordinates (SN) transport sweeps on a
//! partitioned unstructured mesh. It groups directions with identical
//! dependency topology into angle sets, builds each set's dependency graph
//! across partition boundaries, stores face fluxes in a per-set FLUDS, and
//! executes the sweep as a pipelined topological traversal that overlaps
//! local cell work with non-blocking flux exchange between ranks.
//!
//! ## Features
//! - Octant, face-pattern or per-direction angle-set grouping, agreed by all ranks
//! - Chunked, deterministic face-flux exchange with no per-value metadata
//! - Several angle sets in flight per rank, merged deterministically
//! - Vacuum, Dirichlet, reflecting and Robin (albedo) boundaries, with a
//!   fixed-point iteration for mirror-coupled boundaries
//! - Pluggable per-cell kernels through [`sweep::SweepChunk`]
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Determinism
//!
//! Ready cells are processed in ascending cell id, remote face values travel
//! in an order both ranks derive independently, and partial scalar fluxes are
//! summed in ascending angle-set order. Repeated sweeps give identical results.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! sn-sweep = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod sweep;
pub mod sweep_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use sweep_error::SweepError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::data::bc::BoundaryCondition;
    pub use crate::data::flux::{ScalarFluxField, SourceMoments};
    pub use crate::data::material::{Material, TransportProblem};
    pub use crate::data::quadrature::{Direction, Quadrature};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::sweep::{
        AngleGrouping, ConvergenceReport, ReflectingConfig, ReflectingIterator, StepKernel,
        SweepChunk, SweepConfig, SweepReport, SweepScheduler, SweepTask, reference_sweep,
    };
    pub use crate::sweep_error::SweepError;
    pub use crate::topology::{Cell, CellId, Face, FaceNeighbor, PartitionedMesh};
}
