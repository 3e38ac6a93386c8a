// src/ownership/registry.rs

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::ownership::pattern::ReservedPattern;
use crate::types::{WorkerId, normalize_path};

/// Who currently owns a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Covered by a reserved pattern; no worker may claim it.
    Coordinator,
    Worker(WorkerId),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Coordinator => f.write_str("coordinator"),
            Owner::Worker(id) => f.write_str(id),
        }
    }
}

/// A rejected claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub path: String,
    /// Worker whose claim was rejected.
    pub requested_by: WorkerId,
    /// Owner that keeps the path.
    pub holder: Owner,
}

impl Conflict {
    /// True when the path is reserved for the coordinator.
    pub fn is_reserved(&self) -> bool {
        self.holder == Owner::Coordinator
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.holder {
            Owner::Coordinator => write!(
                f,
                "'{}' requested by {} is reserved for the coordinator",
                self.path, self.requested_by
            ),
            Owner::Worker(holder) => write!(
                f,
                "'{}' requested by {} is already claimed by {}",
                self.path, self.requested_by, holder
            ),
        }
    }
}

/// Outcome of [`OwnershipRegistry::assign`].
///
/// Contention is an expected result, so it is a value rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// The path was free and is now claimed by the worker.
    Granted,
    /// The worker already held the path; nothing changed.
    AlreadyHeld,
    Conflict(Conflict),
}

impl Assignment {
    /// True when the worker owns the path afterwards.
    pub fn is_granted(&self) -> bool {
        matches!(self, Assignment::Granted | Assignment::AlreadyHeld)
    }

    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Assignment::Granted | Assignment::AlreadyHeld => None,
            Assignment::Conflict(c) => Some(c),
        }
    }
}

/// Exclusive file claims for concurrently running workers.
///
/// A path is owned by at most one party: the coordinator (through a reserved
/// pattern) or a single worker. Claims are never overwritten; a competing
/// claim is reported as a [`Conflict`] and recorded in the audit trail.
///
/// The registry takes `&mut self` for every mutation. Share it behind a
/// mutex if workers call it directly.
#[derive(Debug, Default)]
pub struct OwnershipRegistry {
    reserved: Vec<ReservedPattern>,
    /// worker -> claimed paths
    claims: HashMap<WorkerId, BTreeSet<String>>,
    /// path -> worker, reverse index of `claims`
    owners: HashMap<String, WorkerId>,
    /// Contested paths in first-seen order, without duplicates.
    conflicts: Vec<String>,
    conflict_index: HashSet<String>,
}

impl OwnershipRegistry {
    /// Create a registry with the given reserved patterns.
    pub fn new<I, S>(reserved: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let reserved = reserved
            .into_iter()
            .map(|p| ReservedPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        debug!(patterns = reserved.len(), "ownership registry created");

        Ok(Self {
            reserved,
            ..Self::default()
        })
    }

    /// Claim `path` for `worker`.
    ///
    /// Checked in order: reserved patterns, then claims of other workers.
    /// Re-assigning a path the worker already holds is a successful no-op
    /// reported as [`Assignment::AlreadyHeld`].
    pub fn assign(&mut self, worker: &str, path: &str) -> Assignment {
        let path = normalize_path(path);

        if self.is_reserved(&path) {
            return self.reject(worker, path, Owner::Coordinator);
        }

        if let Some(holder) = self.owners.get(&path) {
            if holder != worker {
                let holder = Owner::Worker(holder.clone());
                return self.reject(worker, path, holder);
            }
            return Assignment::AlreadyHeld;
        }

        debug!(worker = %worker, path = %path, "claimed path");
        self.owners.insert(path.clone(), worker.to_string());
        self.claims.entry(worker.to_string()).or_default().insert(path);
        Assignment::Granted
    }

    /// Drop `worker`'s claim on `path`. Returns whether a claim existed.
    pub fn release(&mut self, worker: &str, path: &str) -> bool {
        let path = normalize_path(path);

        let Some(paths) = self.claims.get_mut(worker) else {
            return false;
        };
        if !paths.remove(&path) {
            return false;
        }
        if paths.is_empty() {
            self.claims.remove(worker);
        }
        self.owners.remove(&path);

        debug!(worker = %worker, path = %path, "released path");
        true
    }

    /// Drop every claim held by `worker`, returning the released paths.
    pub fn release_worker(&mut self, worker: &str) -> Vec<String> {
        let Some(paths) = self.claims.remove(worker) else {
            return Vec::new();
        };

        for path in &paths {
            self.owners.remove(path);
        }

        debug!(worker = %worker, released = paths.len(), "released all claims of worker");
        paths.into_iter().collect()
    }

    /// Drop every worker claim. Reserved patterns and the conflict trail stay.
    pub fn release_all(&mut self) {
        self.claims.clear();
        self.owners.clear();
    }

    pub fn owner_of(&self, path: &str) -> Option<Owner> {
        let path = normalize_path(path);

        if self.is_reserved(&path) {
            return Some(Owner::Coordinator);
        }
        self.owners.get(&path).map(|w| Owner::Worker(w.clone()))
    }

    /// Whether `path` falls under a reserved pattern.
    pub fn is_reserved(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.reserved.iter().any(|p| p.matches(&path))
    }

    /// Paths currently claimed by `worker`, sorted.
    pub fn claims_of(&self, worker: &str) -> Vec<&str> {
        self.claims
            .get(worker)
            .map(|paths| paths.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn reserved_patterns(&self) -> impl Iterator<Item = &str> {
        self.reserved.iter().map(ReservedPattern::as_str)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Every path that was ever contested, in the order first seen.
    pub fn conflicts(&self) -> &[String] {
        &self.conflicts
    }

    fn reject(&mut self, worker: &str, path: String, holder: Owner) -> Assignment {
        warn!(worker = %worker, path = %path, holder = %holder, "ownership conflict");

        if self.conflict_index.insert(path.clone()) {
            self.conflicts.push(path.clone());
        }

        Assignment::Conflict(Conflict {
            path,
            requested_by: worker.to_string(),
            holder,
        })
    }
}
