//! Planning repository error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("No order ids given, batch consolidation skipped")]
    EmptyOrderSet,

    #[error("No batch found for orders [{order_ids}] after running the batch procedure")]
    BatchNotFound { order_ids: String },

    #[error("Orders [{order_ids}] map to several batches: {batch_ids}")]
    AmbiguousBatch {
        order_ids: String,
        batch_ids: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type PlanningResult<T> = Result<T, PlanningError>;
