//! Model parsing errors.

use thiserror::Error;

/// Result type for model parsing.
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Unknown position: {0}")]
    UnknownPosition(String),

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}
