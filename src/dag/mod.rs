// src/dag/mod.rs

//! Step graph.
//!
//! - [`step`] defines steps, their payloads and runtime state.
//! - [`signal`] is the single-fire completion signal each step carries.
//! - [`graph`] holds the concurrent graph of steps under a synthetic root.
//! - [`builder`] turns an ordered step list into a graph.
//! - [`plan`] computes a static topological plan for dry runs.

pub mod builder;
pub mod graph;
pub mod plan;
pub mod signal;
pub mod step;

pub use builder::build_dag;
pub use graph::{Dag, Node, ROOT_ID};
pub use plan::{PlannedStep, execution_plan};
pub use signal::CompletionSignal;
pub use step::{
    Dependencies, IMMEDIATE_EXECUTION, ImageDependency, RunOptions, Step, StepKind, StepState,
};
