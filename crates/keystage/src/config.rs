#![forbid(unsafe_code)]

//! Manager configuration.
//!
//! [`ManagerConfig`] can be built in code or, with the `config-file` feature,
//! loaded from TOML or JSON. Loaded configurations are validated before they
//! are returned.
//!
//! ```toml
//! # keystage.toml
//! max_undo_depth = 500
//! immediate_by_default = true
//! ```
//!
//! ```rust,ignore
//! let config = ManagerConfig::from_toml_file("keystage.toml")?;
//! let manager = ChangeManager::new(config);
//! ```

#[cfg(feature = "config-file")]
use std::path::Path;

#[cfg(feature = "config-file")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "config-file")]
use crate::error::ConfigError;
use crate::history::{DEFAULT_MAX_DEPTH, HistoryConfig};

/// Settings shared by every target a manager tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config-file", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct ManagerConfig {
    /// Groups kept on each target's undo stack before the oldest is evicted.
    pub max_undo_depth: usize,
    /// Whether newly seen targets start in immediate discipline.
    pub immediate_by_default: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: DEFAULT_MAX_DEPTH,
            immediate_by_default: false,
        }
    }
}

impl ManagerConfig {
    #[must_use]
    pub fn with_max_undo_depth(mut self, depth: usize) -> Self {
        self.max_undo_depth = depth;
        self
    }

    #[must_use]
    pub fn with_immediate_by_default(mut self, immediate: bool) -> Self {
        self.immediate_by_default = immediate;
        self
    }

    /// Load from a TOML string.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validated()
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "config-file")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validated()
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "config-file")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    #[cfg(feature = "config-file")]
    fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Check every parameter.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_undo_depth == 0 {
            errors.push("max_undo_depth must be > 0".into());
        }
        errors
    }

    /// History limits for one target.
    #[must_use]
    pub const fn history_config(&self) -> HistoryConfig {
        HistoryConfig::new(self.max_undo_depth)
    }
}
