// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::Stage;

#[derive(Error, Debug)]
pub enum MirrorError {
    /// Missing or invalid tunables / credentials. Fatal before any task runs.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A unit specification could not be turned into tasks. The unit is skipped.
    #[error("Resolution error for unit '{unit}': {reason}")]
    Resolution { unit: String, reason: String },

    #[error("Extract error: {0}")]
    Extract(String),

    #[error("Prepare error: {0}")]
    Prepare(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Verification error: {0}")]
    Verification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MirrorError {
    /// Wrap a stage failure message in the variant matching `stage`.
    pub fn for_stage(stage: Stage, message: impl Into<String>) -> Self {
        let message = message.into();
        match stage {
            Stage::Extract => MirrorError::Extract(message),
            Stage::Prepare => MirrorError::Prepare(message),
            Stage::Load => MirrorError::Load(message),
            Stage::Verify => MirrorError::Verification(message),
        }
    }

    pub fn resolution(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        MirrorError::Resolution {
            unit: unit.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a transfer backend call.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_map_to_their_variant() {
        assert!(matches!(
            MirrorError::for_stage(Stage::Extract, "boom"),
            MirrorError::Extract(m) if m == "boom"
        ));
        assert!(matches!(
            MirrorError::for_stage(Stage::Verify, "0 rows"),
            MirrorError::Verification(_)
        ));
    }

    #[test]
    fn resolution_error_mentions_unit() {
        let err = MirrorError::resolution("a:b:c:d", "too many fields");
        let msg = err.to_string();
        assert!(msg.contains("a:b:c:d"));
        assert!(msg.contains("too many fields"));
    }
}
