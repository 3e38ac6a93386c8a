// src/dag/mod.rs

//! Wave-based dependency graph and readiness.
//!
//! - [`graph`] turns a flat task list into a [`DependencyMap`] and provides
//!   wave/order queries over the list.
//! - [`ready`] answers "which tasks may start now" for a completed set.

pub mod graph;
pub mod ready;

pub use graph::{
    DependencyMap, all_waves, build_graph, execution_cmp, execution_order, tasks_in_wave,
    validate_tasks,
};
pub use ready::{blocking_satisfied, ready};
