//! Error types for the histogram maker

use ssrl_ntuple::NtupleError;
use thiserror::Error;

/// Histogram maker error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Invalid file-name pattern
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reading chunks or evaluating expressions failed
    #[error(transparent)]
    Ntuple(#[from] NtupleError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
