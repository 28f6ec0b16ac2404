//! Error types for opauto-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid plan date: {0}")]
    InvalidDate(String),

    #[error("Invalid run parameters: {0}")]
    InvalidParams(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
