//! Communication: the communicator abstraction, wire records and collectives.

pub mod communicator;
pub mod exchange;
pub mod wire;

pub use communicator::{CommTag, Communicator, NoComm, RayonComm};
pub use exchange::{all_gather_u32, all_gather_u64, all_reduce_max};
