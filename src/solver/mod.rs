pub mod supervisor;

pub use supervisor::{SolverControl, SolverEvent, SolverSupervisor};
