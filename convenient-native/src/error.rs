//! Error types for the incremental compile engine

use std::path::PathBuf;

/// Errors raised by the engine.
///
/// Per-file read failures and unreadable persisted state never reach callers of
/// [`crate::IncrementalCompiler::execute`]; they degrade the verdict instead.
/// These variants surface from direct store writes, configuration validation
/// and report writing.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    /// I/O failure on a specific path
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// State could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State store failure that is not tied to a single path
    #[error("State store error: {0}")]
    StateStore(String),

    /// Rejected configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NativeError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, NativeError>;
