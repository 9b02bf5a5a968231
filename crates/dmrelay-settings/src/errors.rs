//! Settings error types.

use thiserror::Error;

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Failure to load or parse settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON or has the wrong shape.
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        /// Path that failed.
        path: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}
