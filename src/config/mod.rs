// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: TOML-backed data model, raw and validated.
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: reject structural misconfiguration up front.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_raw};
pub use model::{
    ConcurrencyLimits, ConfigFile, LoggingSection, OwnershipSection, RawConcurrencySection,
    RawConfigFile,
};
pub use validate::validate_config;
