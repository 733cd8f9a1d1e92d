//! Output model produced by the lowering pass and consumed by codegen.

pub mod types;

pub use types::*;
