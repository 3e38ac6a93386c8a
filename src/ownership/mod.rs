// src/ownership/mod.rs

//! Exclusive file ownership between the coordinator and workers.
//!
//! - [`pattern`] compiles reserved paths (exact or single-`*` globs).
//! - [`registry`] tracks worker claims and reports conflicts.

pub mod pattern;
pub mod registry;

pub use pattern::ReservedPattern;
pub use registry::{Assignment, Conflict, Owner, OwnershipRegistry};
