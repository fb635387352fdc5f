//! Error types for configuration loading

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or checking the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML syntax or type error
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON syntax or type error
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is missing or out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
