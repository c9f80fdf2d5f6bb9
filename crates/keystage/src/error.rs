#![forbid(unsafe_code)]

//! Error types.
//!
//! Device rejections are not errors: the boundary reports them as `false`
//! and the manager keeps tracking the slot. The errors here are local
//! defects (mismatched merges, mis-typed values) and configuration failures.

use thiserror::Error;

use crate::key::ChangeKey;

/// Errors raised by the change model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeError {
    /// A change was merged into one addressing a different slot or category.
    #[error("cannot merge change for {incoming} into change for {existing}")]
    IncompatibleMerge {
        existing: ChangeKey,
        incoming: ChangeKey,
    },
    /// A slot value of the wrong kind was supplied for a change.
    #[error("value of kind '{found}' does not fit {key} (expected '{expected}')")]
    ValueMismatch {
        key: ChangeKey,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors raised while loading a [`ManagerConfig`](crate::config::ManagerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config-file")]
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// JSON parse error.
    #[cfg(feature = "config-file")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    /// Validation errors.
    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}
