//! Per-problem data: quadrature, materials, boundary conditions and moment fields.

pub mod bc;
pub mod flux;
pub mod material;
pub mod quadrature;

pub use bc::BoundaryCondition;
pub use flux::{MomentField, ScalarFluxField, SourceMoments};
pub use material::{Material, TransportProblem};
pub use quadrature::{Direction, Quadrature};
