pub mod codec;

pub use codec::{classify_line, SolverCommand, SolverMessage};
