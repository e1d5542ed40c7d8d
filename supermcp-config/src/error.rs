//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
///
/// These are the fatal load-time failures. Per-package validation problems
/// are not errors; they become [`crate::SkippedPackage`] entries instead.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading a configuration file
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing error
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A `configPaths` chain referenced a file that is already being loaded
    #[error("Circular config reference: {path} is already being loaded")]
    CircularReference { path: PathBuf },

    /// A `configPaths` chain nested deeper than the cap
    #[error("Config nesting exceeds maximum depth of {max_depth}")]
    DepthExceeded { max_depth: usize },

    /// The root document is not a JSON object
    #[error("Config file {path} must contain a JSON object at the top level")]
    NotAnObject { path: PathBuf },
}
