// src/types.rs

//! Shared vocabulary types used by every component.

use serde::Deserialize;

/// Stable, unique identifier of a task within one planning cycle.
pub type TaskId = String;

/// Name of a resource class; only used to select a concurrency limit.
pub type Tier = String;

/// Identifier of a worker (process, thread or remote agent) claiming files.
pub type WorkerId = String;

/// A unit of work as handed over by plan parsing.
///
/// Descriptors are immutable once scheduled: every component takes them by
/// shared reference and never rewrites `id`, `wave` or `tier`.
///
/// ```toml
/// [[task]]
/// id = "api-client"
/// wave = 2
/// tier = "heavy"
/// files = ["src/api/client.ts"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskDescriptor {
    pub id: TaskId,

    /// Wave number, `>= 1`. Tasks in the same wave never block each other.
    pub wave: u32,

    /// Concurrency tier key.
    #[serde(default = "default_tier")]
    pub tier: Tier,

    /// Files the task intends to touch; claimed before work starts.
    #[serde(default)]
    pub files: Vec<String>,
}

pub const DEFAULT_TIER: &str = "default";

fn default_tier() -> Tier {
    DEFAULT_TIER.to_string()
}

impl TaskDescriptor {
    pub fn new(id: impl Into<TaskId>, wave: u32, tier: impl Into<Tier>) -> Self {
        Self {
            id: id.into(),
            wave,
            tier: tier.into(),
            files: Vec::new(),
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }
}

/// Normalise a file path for ownership bookkeeping.
///
/// Backslashes become forward slashes and a leading `./` is dropped, so that
/// `./src\a.ts` and `src/a.ts` refer to the same claim. Nothing else is
/// rewritten; surrounding whitespace is part of the path.
pub fn normalize_path(path: &str) -> String {
    let mut s = path.replace('\\', "/");
    while let Some(rest) = s.strip_prefix("./") {
        s = rest.to_string();
    }
    s
}

