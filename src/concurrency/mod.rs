// src/concurrency/mod.rs

//! Per-tier admission control.
//!
//! [`ConcurrencyManager`] is a keyed semaphore: every tier key gets its own
//! limit, active count and FIFO queue of suspended `acquire` calls. A freed
//! slot is handed directly to the oldest waiter instead of being returned to
//! the pool, so a late arrival can never overtake someone already queued.
//!
//! Waiters are settled through one-shot channels; whichever of
//! `release` / `cancel_waiters` reaches a waiter first under the tier lock
//! decides its outcome, and the other path no longer sees it.

pub mod manager;
pub(crate) mod slot;

pub use manager::ConcurrencyManager;
