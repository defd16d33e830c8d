//! Engine configuration
//!
//! Loaded from JSON; every field has a default so an empty object is a valid
//! configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Rules strictly shorter than this are rejected by the validator.
pub const DEFAULT_MIN_RULE_LENGTH: usize = 3;

/// Lines handed to the parser per loader step.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config format: {0}")]
    InvalidFormat(#[from] serde_json::Error),
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine name passed to the scriptlet resolver
    pub engine: String,
    /// Engine version passed to the scriptlet resolver
    pub version: String,
    pub parser: ParserConfig,
    pub loader: LoaderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: "extension".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            parser: ParserConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

/// How a modifier listed twice in one rule is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateModifierPolicy {
    /// The later occurrence replaces the earlier one
    #[default]
    LastWins,
    /// The rule is rejected
    Reject,
}

/// Rule parser configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub min_rule_length: usize,
    pub duplicate_modifiers: DuplicateModifierPolicy,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            min_rule_length: DEFAULT_MIN_RULE_LENGTH,
            duplicate_modifiers: DuplicateModifierPolicy::default(),
        }
    }
}

/// Filter list loader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub chunk_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "engine",
                reason: "must not be empty".to_string(),
            });
        }
        if self.loader.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "loader.chunk_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
