// src/config/mod.rs

//! Configuration loading and validation for dbmirror.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate tunables, credentials and backend templates (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{apply_overrides, default_config_path, load_and_validate, load_from_path};
pub use model::{
    BackendSection, ConfigFile, Connection, ConnectionSection, RawConfigFile, SettingsSection,
    TransferSection, Tunables,
};
pub use validate::{CONCURRENCY_RANGE, MAX_ATTEMPTS_RANGE, validate_concurrency, validate_config};
