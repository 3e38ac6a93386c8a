// src/engine/mod.rs

//! Orchestration root.
//!
//! [`Dispatcher`] wires the dependency graph, the concurrency manager and
//! the ownership registry into the per-cycle admission flow:
//!
//! - poll ready tasks as the completed set grows
//! - acquire the task's tier slot
//! - claim its declared files
//! - give slot and files back on completion or abandonment
//!
//! It does not run tasks; callers report outcomes through `complete` and
//! `abandon`.

pub mod dispatcher;

pub use dispatcher::{Admission, Dispatcher};
