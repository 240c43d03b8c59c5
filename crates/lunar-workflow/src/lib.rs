//! Lunar Workflow
//!
//! Graph view over a [`lunar_config::WorkflowModel`]:
//! - a multigraph of component labels with one edge per dependency
//! - the structural validation pass (dangling edges, cycles, terminal flags)
//! - breadth-first layering used for display ordering

mod error;
mod graph;
mod workflow;

pub use error::WorkflowError;
pub use graph::{Dag, Edge};
pub use workflow::{WorkflowGraph, parse_workflow};
