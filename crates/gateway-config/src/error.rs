//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed
    #[error("failed to parse config file {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The file extension is not one of yaml, yml or toml
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    /// A value failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
