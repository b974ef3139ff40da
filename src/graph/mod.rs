//! Dependency and call graphs.
//!
//! Both graphs are derived views over the extracted references: they can be
//! rebuilt without re-reading or re-parsing any file. Cycles are ordinary
//! data here, never an error.

pub mod calls;
pub mod deps;

pub use calls::{CallGraph, Direction, TraversalResult};
pub use deps::DependencyGraph;
