// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::logging::LogLevel;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [concurrency]
/// default_limit = 0
///
/// [concurrency.tiers]
/// heavy = 1
/// standard = 3
///
/// [ownership]
/// reserved = ["package.json", "*.lock"]
///
/// [logging]
/// level = "debug"
/// ```
///
/// All sections are optional. Limits are signed here so that a negative
/// value reaches validation and is reported as a configuration error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub concurrency: RawConcurrencySection,

    #[serde(default)]
    pub ownership: OwnershipSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[concurrency]` section as written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConcurrencySection {
    /// Limit for tiers not listed under `[concurrency.tiers]`. `0` = unlimited.
    #[serde(default)]
    pub default_limit: i64,

    /// Per-tier limits. `0` = unlimited.
    #[serde(default)]
    pub tiers: BTreeMap<String, i64>,
}

/// `[ownership]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnershipSection {
    /// Paths owned by the coordinator: exact paths or globs with one `*`.
    #[serde(default)]
    pub reserved: Vec<String>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// Validated concurrency limits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcurrencyLimits {
    pub default_limit: usize,
    pub tiers: BTreeMap<String, usize>,
}

/// Validated configuration. Obtain one through `TryFrom<RawConfigFile>` or
/// [`load_and_validate`](crate::config::load_and_validate).
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    concurrency: ConcurrencyLimits,
    ownership: OwnershipSection,
    logging: LoggingSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        concurrency: ConcurrencyLimits,
        ownership: OwnershipSection,
        logging: LoggingSection,
    ) -> Self {
        Self {
            concurrency,
            ownership,
            logging,
        }
    }

    pub fn concurrency(&self) -> &ConcurrencyLimits {
        &self.concurrency
    }

    pub fn ownership(&self) -> &OwnershipSection {
        &self.ownership
    }

    pub fn logging(&self) -> &LoggingSection {
        &self.logging
    }
}
