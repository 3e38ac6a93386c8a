// src/dag/ready.rs

//! Readiness queries over a [`DependencyMap`].
//!
//! Both functions are pure: they never mutate their inputs and can be
//! polled as often as needed while the completed set grows.

use std::collections::HashSet;

use crate::dag::graph::DependencyMap;
use crate::types::{TaskDescriptor, TaskId};

/// Tasks that are not completed yet and whose blockers are all completed.
///
/// A task missing from `deps` is treated as having no blockers. Output keeps
/// the order of `tasks`; use [`execution_order`](crate::dag::execution_order)
/// if a canonical order is needed.
pub fn ready<'a>(
    tasks: &'a [TaskDescriptor],
    deps: &DependencyMap,
    completed: &HashSet<TaskId>,
) -> Vec<&'a TaskDescriptor> {
    tasks
        .iter()
        .filter(|t| !completed.contains(&t.id))
        .filter(|t| blockers_done(t, deps, completed))
        .collect()
}

/// Every task whose blockers are all completed, completed tasks included.
///
/// This is the "blocking-satisfied" view. With `[A(1), B(1), C(2)]` and
/// `completed = {A, B}` it returns all three; callers that dispatch work
/// should use [`ready`] or filter out ids they already started.
pub fn blocking_satisfied<'a>(
    tasks: &'a [TaskDescriptor],
    deps: &DependencyMap,
    completed: &HashSet<TaskId>,
) -> Vec<&'a TaskDescriptor> {
    tasks
        .iter()
        .filter(|t| blockers_done(t, deps, completed))
        .collect()
}

fn blockers_done(task: &TaskDescriptor, deps: &DependencyMap, completed: &HashSet<TaskId>) -> bool {
    match deps.blockers_of(&task.id) {
        Some(blockers) => blockers.iter().all(|b| completed.contains(b)),
        None => true,
    }
}
