// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::config::validate::validate_concurrency;
use crate::errors::{MirrorError, Result};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        MirrorError::Configuration(format!("cannot read config {}: {e}", path.display()))
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks tunable ranges, durations, credentials and backend templates.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Apply `dbmirror run` flag overrides on top of a validated config.
pub fn apply_overrides(
    mut cfg: ConfigFile,
    concurrency: Option<usize>,
    units: Vec<String>,
) -> Result<ConfigFile> {
    if let Some(concurrency) = concurrency {
        validate_concurrency(concurrency)?;
        cfg.tunables.concurrency = concurrency;
    }
    if !units.is_empty() {
        cfg.units = units;
    }
    if cfg.units.is_empty() {
        return Err(MirrorError::Configuration(
            "no units to transfer: set [transfer].units or pass --unit".to_string(),
        ));
    }
    Ok(cfg)
}

/// Default config location: `Dbmirror.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Dbmirror.toml")
}
