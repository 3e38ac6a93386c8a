// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. explicit level passed by the embedding application
//! 2. `WAVESCHED_LOG` environment variable (e.g. "info", "debug")
//! 3. `[logging].level` from the config file
//! 4. default to `info`
//!
//! Logs go to STDERR so that the embedding program keeps stdout.

use anyhow::Result;
use serde::Deserialize;
use tracing_subscriber::fmt;

use crate::config::ConfigFile;

/// Log level as accepted by callers and the config file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Initialise the global logging subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: Option<LogLevel>) -> Result<()> {
    init_with(level, None)
}

/// Like [`init_logging`], falling back to the config's `[logging].level`.
pub fn init_logging_from_config(level: Option<LogLevel>, cfg: &ConfigFile) -> Result<()> {
    init_with(level, cfg.logging().level)
}

fn init_with(explicit: Option<LogLevel>, configured: Option<LogLevel>) -> Result<()> {
    let level = explicit
        .or_else(|| {
            std::env::var("WAVESCHED_LOG")
                .ok()
                .and_then(|s| parse_level_str(&s))
        })
        .or(configured)
        .map(level_from_log_level)
        .unwrap_or(tracing::Level::INFO);

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

/// Parse a level name as used in `WAVESCHED_LOG`.
pub fn parse_level_str(s: &str) -> Option<LogLevel> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(LogLevel::Error),
        "warn" | "warning" => Some(LogLevel::Warn),
        "info" => Some(LogLevel::Info),
        "debug" => Some(LogLevel::Debug),
        "trace" => Some(LogLevel::Trace),
        _ => None,
    }
}
