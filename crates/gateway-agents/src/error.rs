//! Registry error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading agent configurations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The agent directory could not be listed
    #[error("failed to read agent directory {path}: {source}")]
    ReadDir {
        /// Directory path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// An agent file could not be read
    #[error("failed to read agent file {path}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// An agent file is not a valid configuration
    #[error("failed to parse agent file {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}
