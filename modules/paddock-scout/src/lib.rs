pub mod assembler;
pub mod error;

pub use assembler::{Assembler, AssemblyOutcome};
pub use error::AssemblyError;
