// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaveschedError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid task plan: {0}")]
    InvalidPlan(String),

    /// A queued `acquire` was cancelled before a slot was handed to it.
    ///
    /// Callers should treat this as abandonment of the work item, not as a
    /// transient failure worth retrying.
    #[error("Queued acquire cancelled for tier '{tier}'")]
    QueueCancelled { tier: String },

    #[error("Unknown task: {0}")]
    TaskNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WaveschedError {
    pub fn queue_cancelled(tier: impl Into<String>) -> Self {
        WaveschedError::QueueCancelled { tier: tier.into() }
    }

    /// Whether this error is a cancellation of a queued acquire.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaveschedError::QueueCancelled { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WaveschedError>;
