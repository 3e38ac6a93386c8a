// src/lib.rs

//! Task admission core for wave-organized plans.
//!
//! - [`dag`]: wave-based blocking map and readiness queries
//! - [`concurrency`]: per-tier FIFO semaphore with handoff and cancellation
//! - [`ownership`]: exclusive file claims and conflict detection
//! - [`engine`]: a per-cycle [`Dispatcher`] tying the three together
//!
//! Nothing here executes tasks. Callers start work once admitted and
//! report back through the dispatcher (or the components directly).

pub mod concurrency;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod ownership;
pub mod types;

pub use concurrency::ConcurrencyManager;
pub use dag::{DependencyMap, build_graph, execution_order, ready};
pub use engine::{Admission, Dispatcher};
pub use errors::{Result, WaveschedError};
pub use ownership::{Assignment, Conflict, Owner, OwnershipRegistry};
pub use types::{TaskDescriptor, TaskId, Tier, WorkerId};
