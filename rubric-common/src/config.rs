//! Configuration file loading and environment overrides
//!
//! Services resolve settings in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! This module provides the file and environment tiers; argument parsing
//! stays in each binary.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Error, Result};

/// Default TOML path for a module: `<config dir>/rubric/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rubric").join(format!("{}.toml", module_name)))
}

/// OS-dependent default data folder (database location)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rubric"))
        .unwrap_or_else(|| PathBuf::from("./rubric_data"))
}

/// Load a TOML config file
///
/// A missing file is not an error: the type's defaults are returned so a
/// fresh install runs without any configuration.
///
/// # Errors
/// [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Read and parse an environment variable
///
/// Unset or blank variables yield `Ok(None)`.
///
/// # Errors
/// [`Error::Config`] if the variable is set but does not parse.
pub fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}='{}' is invalid: {}", name, raw, e))),
        _ => Ok(None),
    }
}
