// src/dag/graph.rs

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::errors::{Result, WaveschedError};
use crate::types::{TaskDescriptor, TaskId};

/// Blocking sets keyed by task id.
///
/// Edges are wave-granular: a task in wave `W` is blocked by every task in a
/// wave strictly lower than `W`, and by nothing else. Same-wave tasks can
/// therefore always run in parallel, and the map can never contain a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMap {
    blocking: HashMap<TaskId, BTreeSet<TaskId>>,
}

impl DependencyMap {
    /// Blocking set of `task`, or `None` if the task is not in the map.
    pub fn blockers_of(&self, task: &str) -> Option<&BTreeSet<TaskId>> {
        self.blocking.get(task)
    }

    pub fn contains(&self, task: &str) -> bool {
        self.blocking.contains_key(task)
    }

    pub fn len(&self) -> usize {
        self.blocking.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocking.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<TaskId>)> {
        self.blocking.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Check the structural invariants of a task list.
///
/// - ids are non-empty and unique
/// - waves start at 1
pub fn validate_tasks(tasks: &[TaskDescriptor]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(tasks.len());

    for task in tasks {
        if task.id.trim().is_empty() {
            return Err(WaveschedError::InvalidPlan(
                "task id must not be empty".to_string(),
            ));
        }
        if task.wave == 0 {
            return Err(WaveschedError::InvalidPlan(format!(
                "task '{}' has wave 0; waves start at 1",
                task.id
            )));
        }
        if !seen.insert(task.id.as_str()) {
            return Err(WaveschedError::InvalidPlan(format!(
                "duplicate task id '{}'",
                task.id
            )));
        }
    }

    Ok(())
}

/// Build the blocking map for a task list.
///
/// Wave numbers need not be consecutive: with waves `{1, 3}`, wave-3 tasks
/// are blocked by the wave-1 tasks only. An empty list yields an empty map.
pub fn build_graph(tasks: &[TaskDescriptor]) -> Result<DependencyMap> {
    validate_tasks(tasks)?;

    let mut by_wave: BTreeMap<u32, Vec<&TaskId>> = BTreeMap::new();
    for task in tasks {
        by_wave.entry(task.wave).or_default().push(&task.id);
    }

    let mut lower: BTreeSet<TaskId> = BTreeSet::new();
    let mut blocking = HashMap::with_capacity(tasks.len());

    // Waves ascend, so `lower` always holds exactly the ids of earlier waves.
    for (wave, ids) in by_wave {
        debug!(wave, tasks = ids.len(), blockers = lower.len(), "building wave");
        for id in &ids {
            blocking.insert((*id).clone(), lower.clone());
        }
        lower.extend(ids.into_iter().cloned());
    }

    Ok(DependencyMap { blocking })
}

/// Tasks declared in `wave`, in input order.
pub fn tasks_in_wave(tasks: &[TaskDescriptor], wave: u32) -> Vec<&TaskDescriptor> {
    tasks.iter().filter(|t| t.wave == wave).collect()
}

/// Every wave number that occurs in `tasks`, sorted and deduplicated.
pub fn all_waves(tasks: &[TaskDescriptor]) -> Vec<u32> {
    let waves: BTreeSet<u32> = tasks.iter().map(|t| t.wave).collect();
    waves.into_iter().collect()
}

/// Deterministic dispatch order: wave ascending, then id ascending.
///
/// The id tie-break is lexicographic so repeated runs over the same plan
/// always produce the same order.
pub fn execution_order(tasks: &[TaskDescriptor]) -> Vec<&TaskDescriptor> {
    let mut ordered: Vec<&TaskDescriptor> = tasks.iter().collect();
    ordered.sort_by(|a, b| execution_cmp(a, b));
    ordered
}

/// Comparator behind [`execution_order`].
pub fn execution_cmp(a: &TaskDescriptor, b: &TaskDescriptor) -> Ordering {
    a.wave.cmp(&b.wave).then_with(|| a.id.cmp(&b.id))
}
