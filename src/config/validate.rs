// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{ConcurrencyLimits, ConfigFile, RawConcurrencySection, RawConfigFile};
use crate::errors::{Result, WaveschedError};
use crate::ownership::ReservedPattern;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = WaveschedError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let limits = validate_concurrency(&raw.concurrency)?;
        validate_reserved(&raw.ownership.reserved)?;
        Ok(ConfigFile::new_unchecked(limits, raw.ownership, raw.logging))
    }
}

/// Validate a raw config without consuming it.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_concurrency(&cfg.concurrency)?;
    validate_reserved(&cfg.ownership.reserved)?;
    Ok(())
}

fn validate_concurrency(section: &RawConcurrencySection) -> Result<ConcurrencyLimits> {
    let default_limit = to_limit("[concurrency].default_limit", section.default_limit)?;

    let mut tiers = BTreeMap::new();
    for (tier, limit) in &section.tiers {
        if tier.trim().is_empty() {
            return Err(WaveschedError::ConfigError(
                "[concurrency.tiers] contains an empty tier name".to_string(),
            ));
        }
        let limit = to_limit(&format!("[concurrency.tiers].{tier}"), *limit)?;
        tiers.insert(tier.clone(), limit);
    }

    Ok(ConcurrencyLimits {
        default_limit,
        tiers,
    })
}

fn to_limit(key: &str, value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        WaveschedError::ConfigError(format!(
            "{key} must be >= 0 (got {value}); use 0 for unlimited"
        ))
    })
}

fn validate_reserved(patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        ReservedPattern::parse(pattern)?;
    }
    Ok(())
}
