//! Angular sweep: grouping, dependency graphs, face-flux storage, the
//! pipelined scheduler and the reflecting-boundary iteration.

pub mod angle_set;
pub mod chunk;
pub mod config;
pub mod cycles;
pub mod fluds;
pub mod graph;
pub mod reference;
pub mod reflecting;
pub mod scheduler;

pub use angle_set::{AngleSetSpec, group_directions};
pub use chunk::{CellInput, StepKernel, SweepChunk};
pub use config::{AngleGrouping, ReflectingConfig, SweepConfig};
pub use cycles::check_partition_cycles;
pub use fluds::{Fluds, ReflectedFluxStore, Slot};
pub use graph::{DependencyGraph, FaceCounters};
pub use reference::reference_sweep;
pub use reflecting::{ConvergenceReport, ReflectingIterator};
pub use scheduler::{AngleSet, SweepReport, SweepScheduler, SweepTask};
