// src/engine/dispatcher.rs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::concurrency::ConcurrencyManager;
use crate::config::ConfigFile;
use crate::dag::{self, DependencyMap};
use crate::errors::{Result, WaveschedError};
use crate::ownership::{Assignment, Conflict, Owner, OwnershipRegistry};
use crate::types::{TaskDescriptor, TaskId, WorkerId, normalize_path};

/// Result of [`Dispatcher::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Slot acquired and every declared file claimed; the worker may start.
    Granted,
    /// A declared file is owned by someone else. Nothing is held; retry
    /// after the holder finishes.
    Deferred(Conflict),
    /// Blocked by an earlier wave, already dispatched, already completed,
    /// or withdrawn while waiting for its slot.
    NotReady,
}

/// Where a dispatched task is in its admission.
#[derive(Debug)]
enum Phase {
    /// Queued on its tier. Holds no slot and no files. Sending on (or
    /// dropping) `withdraw` makes the pending `admit` give up.
    Waiting { withdraw: oneshot::Sender<()> },
    /// Holds a tier slot and its files.
    Admitted,
}

#[derive(Debug)]
struct Dispatch {
    worker: WorkerId,
    /// Identifies the `admit` call that created this entry.
    ticket: u64,
    phase: Phase,
}

impl Dispatch {
    fn is_admitted(&self) -> bool {
        matches!(self.phase, Phase::Admitted)
    }
}

/// Mutable per-cycle bookkeeping.
#[derive(Debug)]
struct CycleState {
    completed: HashSet<TaskId>,
    dispatched: HashMap<TaskId, Dispatch>,
    next_ticket: u64,
    ownership: OwnershipRegistry,
}

/// Orchestration root for one planning cycle.
///
/// Owns the task list and its blocking map, and drives admission through a
/// shared [`ConcurrencyManager`] and an [`OwnershipRegistry`]:
///
/// 1. [`next_ready`](Self::next_ready) lists startable tasks.
/// 2. [`admit`](Self::admit) waits for a tier slot, then claims files.
/// 3. [`complete`](Self::complete) / [`abandon`](Self::abandon) give both back.
///
/// The concurrency manager is held by `Arc` so its tier state can outlive
/// the cycle and be handed to the next dispatcher.
#[derive(Debug)]
pub struct Dispatcher {
    tasks: Vec<TaskDescriptor>,
    index: HashMap<TaskId, usize>,
    deps: DependencyMap,
    concurrency: Arc<ConcurrencyManager>,
    state: Mutex<CycleState>,
}

impl Dispatcher {
    /// Build a dispatcher with fresh components from validated config.
    pub fn new(tasks: Vec<TaskDescriptor>, cfg: &ConfigFile) -> Result<Self> {
        let concurrency = Arc::new(ConcurrencyManager::from_limits(cfg.concurrency()));
        let ownership = OwnershipRegistry::new(&cfg.ownership().reserved)?;
        Self::with_parts(tasks, concurrency, ownership)
    }

    /// Build a dispatcher around existing components.
    pub fn with_parts(
        tasks: Vec<TaskDescriptor>,
        concurrency: Arc<ConcurrencyManager>,
        ownership: OwnershipRegistry,
    ) -> Result<Self> {
        let deps = dag::build_graph(&tasks)?;
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        info!(
            tasks = tasks.len(),
            waves = ?dag::all_waves(&tasks),
            "dispatcher ready for new cycle"
        );

        Ok(Self {
            tasks,
            index,
            deps,
            concurrency,
            state: Mutex::new(CycleState {
                completed: HashSet::new(),
                dispatched: HashMap::new(),
                next_ticket: 0,
                ownership,
            }),
        })
    }

    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    pub fn dependency_map(&self) -> &DependencyMap {
        &self.deps
    }

    pub fn concurrency(&self) -> &Arc<ConcurrencyManager> {
        &self.concurrency
    }

    pub fn task(&self, id: &str) -> Option<&TaskDescriptor> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Tasks that may be admitted now, in execution order.
    ///
    /// Excludes completed tasks and tasks already handed to a worker,
    /// whether admitted or still waiting for a slot.
    pub fn next_ready(&self) -> Vec<&TaskDescriptor> {
        let state = self.lock_state();
        let mut out: Vec<&TaskDescriptor> = dag::ready(&self.tasks, &self.deps, &state.completed)
            .into_iter()
            .filter(|t| !state.dispatched.contains_key(&t.id))
            .collect();
        out.sort_by(|a, b| dag::execution_cmp(a, b));
        out
    }

    /// Admit `task` for `worker`.
    ///
    /// Suspends on the task's tier until a slot is free, then claims every
    /// declared file. On a file conflict, claims made by this call are
    /// dropped and the slot is released before returning
    /// [`Admission::Deferred`].
    ///
    /// A wait withdrawn through [`abandon`](Self::abandon),
    /// [`complete`](Self::complete) or [`release_worker`](Self::release_worker)
    /// resolves to [`Admission::NotReady`] without holding anything.
    ///
    /// Fails with [`WaveschedError::QueueCancelled`] if the tier queue is
    /// cancelled while waiting, and [`WaveschedError::TaskNotFound`] for
    /// unknown ids.
    pub async fn admit(&self, worker: &str, task_id: &str) -> Result<Admission> {
        let task = self
            .task(task_id)
            .ok_or_else(|| WaveschedError::TaskNotFound(task_id.to_string()))?;

        // Reserve the task before suspending so concurrent admits skip it.
        let (ticket, withdrawn) = {
            let mut state = self.lock_state();
            if !self.is_admissible(&state, task) {
                debug!(task = %task.id, worker = %worker, "task not ready for admission");
                return Ok(Admission::NotReady);
            }
            let ticket = state.next_ticket;
            state.next_ticket += 1;

            let (tx, rx) = oneshot::channel();
            state.dispatched.insert(
                task.id.clone(),
                Dispatch {
                    worker: worker.to_string(),
                    ticket,
                    phase: Phase::Waiting { withdraw: tx },
                },
            );
            (ticket, rx)
        };
        let _reservation = Reservation {
            dispatcher: self,
            task_id: &task.id,
            ticket,
        };

        // Dropping the acquire future on withdrawal takes it out of the queue.
        let acquired = tokio::select! {
            biased;
            res = self.concurrency.acquire(&task.tier) => {
                res?;
                true
            }
            _ = withdrawn => false,
        };
        if !acquired {
            debug!(task = %task.id, worker = %worker, "queued admission withdrawn");
            return Ok(Admission::NotReady);
        }

        let mut state = self.lock_state();

        // The wait may have been withdrawn after the slot was handed over.
        let still_ours = state
            .dispatched
            .get(&task.id)
            .is_some_and(|d| d.ticket == ticket && !d.is_admitted());
        if !still_ours {
            drop(state);
            self.concurrency.release(&task.tier);
            debug!(task = %task.id, worker = %worker, "admission withdrawn after slot grant");
            return Ok(Admission::NotReady);
        }

        let mut claimed: Vec<&str> = Vec::with_capacity(task.files.len());

        for file in &task.files {
            match state.ownership.assign(worker, file) {
                Assignment::Granted => claimed.push(file),
                Assignment::AlreadyHeld => {}
                Assignment::Conflict(conflict) => {
                    for path in claimed {
                        state.ownership.release(worker, path);
                    }
                    state.dispatched.remove(&task.id);
                    drop(state);
                    self.concurrency.release(&task.tier);

                    warn!(
                        task = %task.id,
                        worker = %worker,
                        path = %conflict.path,
                        holder = %conflict.holder,
                        "admission deferred by ownership conflict"
                    );
                    return Ok(Admission::Deferred(conflict));
                }
            }
        }

        if let Some(entry) = state.dispatched.get_mut(&task.id) {
            entry.phase = Phase::Admitted;
        }

        info!(
            task = %task.id,
            worker = %worker,
            tier = %task.tier,
            files = task.files.len(),
            "task admitted"
        );
        Ok(Admission::Granted)
    }

    /// Record successful completion of `task_id` and release what it held.
    ///
    /// A still-queued admission of the task is withdrawn.
    pub fn complete(&self, worker: &str, task_id: &str) -> Result<()> {
        let task = self
            .task(task_id)
            .ok_or_else(|| WaveschedError::TaskNotFound(task_id.to_string()))?;

        self.release_task(worker, task);
        self.lock_state().completed.insert(task.id.clone());

        debug!(task = %task.id, worker = %worker, "task completed");
        Ok(())
    }

    /// Give up on `task_id` without completing it; it becomes admissible
    /// again once its blockers allow.
    ///
    /// A still-queued admission is withdrawn rather than given a slot.
    pub fn abandon(&self, worker: &str, task_id: &str) -> Result<()> {
        let task = self
            .task(task_id)
            .ok_or_else(|| WaveschedError::TaskNotFound(task_id.to_string()))?;

        self.release_task(worker, task);
        warn!(task = %task.id, worker = %worker, "task abandoned");
        Ok(())
    }

    /// Tear down a worker: every claim it holds is released and every task
    /// admitted or queued for it is abandoned.
    pub fn release_worker(&self, worker: &str) -> Vec<TaskId> {
        let mut state = self.lock_state();
        let ids: Vec<TaskId> = state
            .dispatched
            .iter()
            .filter(|(_, d)| d.worker == worker)
            .map(|(t, _)| t.clone())
            .collect();

        let mut slots = Vec::new();
        for id in &ids {
            if let Some(entry) = state.dispatched.remove(id) {
                if let Phase::Waiting { withdraw } = entry.phase {
                    let _ = withdraw.send(());
                } else if let Some(task) = self.task(id) {
                    slots.push(task.tier.as_str());
                }
            }
        }
        state.ownership.release_worker(worker);
        drop(state);

        for tier in slots {
            self.concurrency.release(tier);
        }

        if !ids.is_empty() {
            warn!(worker = %worker, abandoned = ?ids, "worker released with tasks in flight");
        }
        ids
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.lock_state().completed.contains(task_id)
    }

    /// Worker a task is currently admitted or queued for.
    pub fn worker_of(&self, task_id: &str) -> Option<WorkerId> {
        self.lock_state()
            .dispatched
            .get(task_id)
            .map(|d| d.worker.clone())
    }

    /// Whether `task_id` holds its slot and files.
    pub fn is_admitted(&self, task_id: &str) -> bool {
        self.lock_state()
            .dispatched
            .get(task_id)
            .is_some_and(Dispatch::is_admitted)
    }

    /// Whether every task of the cycle has completed.
    pub fn is_finished(&self) -> bool {
        let state = self.lock_state();
        self.tasks.iter().all(|t| state.completed.contains(&t.id))
    }

    pub fn owner_of(&self, path: &str) -> Option<Owner> {
        self.lock_state().ownership.owner_of(path)
    }

    pub fn has_conflicts(&self) -> bool {
        self.lock_state().ownership.has_conflicts()
    }

    pub fn conflicts(&self) -> Vec<String> {
        self.lock_state().ownership.conflicts().to_vec()
    }

    /// Cancel all waiters, zero tier counts and drop all file claims.
    pub fn shutdown(&self) {
        self.concurrency.clear();

        let mut state = self.lock_state();
        state.ownership.release_all();
        state.dispatched.clear();

        info!(completed = state.completed.len(), total = self.tasks.len(), "dispatcher shut down");
    }

    fn is_admissible(&self, state: &CycleState, task: &TaskDescriptor) -> bool {
        if state.completed.contains(&task.id) || state.dispatched.contains_key(&task.id) {
            return false;
        }
        self.deps
            .blockers_of(&task.id)
            .map(|b| b.iter().all(|id| state.completed.contains(id)))
            .unwrap_or(true)
    }

    /// Undo the dispatch of a task handed to `worker`.
    ///
    /// A queued admission is withdrawn. An admitted task gives back its slot
    /// and every file no other admitted task of the same worker declares.
    /// Tasks handed to a different worker are left alone.
    fn release_task(&self, worker: &str, task: &TaskDescriptor) {
        let mut state = self.lock_state();

        let held = state
            .dispatched
            .get(&task.id)
            .is_some_and(|d| d.worker == worker);
        if !held {
            debug!(task = %task.id, worker = %worker, "release for task not dispatched to worker");
            return;
        }

        let Some(entry) = state.dispatched.remove(&task.id) else {
            return;
        };
        if let Phase::Waiting { withdraw } = entry.phase {
            let _ = withdraw.send(());
            debug!(task = %task.id, worker = %worker, "withdrew queued admission");
            return;
        }

        let still_needed = self.files_in_use(&state, worker);
        for file in &task.files {
            if !still_needed.contains(&normalize_path(file)) {
                state.ownership.release(worker, file);
            }
        }
        drop(state);

        self.concurrency.release(&task.tier);
    }

    /// Normalised files declared by tasks currently admitted for `worker`.
    fn files_in_use(&self, state: &CycleState, worker: &str) -> HashSet<String> {
        state
            .dispatched
            .iter()
            .filter(|(_, d)| d.worker == worker && d.is_admitted())
            .filter_map(|(id, _)| self.task(id))
            .flat_map(|t| t.files.iter().map(|f| normalize_path(f)))
            .collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, CycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the dispatch entry created by one `admit` call if that call ends
/// before the task is admitted: the acquire failed, the future was dropped,
/// or files conflicted. Entries of later `admit` calls are left alone.
struct Reservation<'a> {
    dispatcher: &'a Dispatcher,
    task_id: &'a str,
    ticket: u64,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut state = self.dispatcher.lock_state();
        let ours = state
            .dispatched
            .get(self.task_id)
            .is_some_and(|d| d.ticket == self.ticket && !d.is_admitted());
        if ours {
            state.dispatched.remove(self.task_id);
        }
    }
}
