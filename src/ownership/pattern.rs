// src/ownership/pattern.rs

use std::fmt;

use regex::Regex;

use crate::errors::{Result, WaveschedError};
use crate::types::normalize_path;

/// A coordinator-reserved path: either an exact path or a glob with a
/// single `*`.
///
/// The `*` matches any run of characters, `/` included, so `docs/*` covers
/// the whole `docs` tree. Every other character is literal.
#[derive(Clone)]
pub struct ReservedPattern {
    raw: String,
    matcher: Matcher,
}

#[derive(Clone)]
enum Matcher {
    Exact(String),
    Wildcard(Regex),
}

impl fmt::Debug for ReservedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReservedPattern").field(&self.raw).finish()
    }
}

impl ReservedPattern {
    /// Compile a pattern; more than one `*` is a configuration error.
    pub fn parse(pattern: &str) -> Result<Self> {
        let raw = normalize_path(pattern);
        if raw.trim().is_empty() {
            return Err(WaveschedError::ConfigError(
                "reserved pattern must not be empty".to_string(),
            ));
        }

        let matcher = match raw.split_once('*') {
            None => Matcher::Exact(raw.clone()),
            Some((_, suffix)) if suffix.contains('*') => {
                return Err(WaveschedError::ConfigError(format!(
                    "reserved pattern '{raw}' has more than one '*'"
                )));
            }
            Some((prefix, suffix)) => {
                let source = format!("^{}.*{}$", regex::escape(prefix), regex::escape(suffix));
                let re = Regex::new(&source).map_err(|e| {
                    WaveschedError::ConfigError(format!("reserved pattern '{raw}': {e}"))
                })?;
                Matcher::Wildcard(re)
            }
        };

        Ok(Self { raw, matcher })
    }

    /// The pattern as configured (after path normalisation).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.matcher, Matcher::Wildcard(_))
    }

    /// Whether an already-normalised path falls under this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(p) => p == path,
            Matcher::Wildcard(re) => re.is_match(path),
        }
    }
}
