//! Engine error types.
//!
//! Only run-fatal conditions are errors. Per-record failures land in the run
//! summary instead.

use opauto_core::CoreError;
use opauto_gateway::GatewayError;
use opauto_planning::PlanningError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid run parameters: {0}")]
    InvalidParams(#[from] CoreError),

    #[error("Planning database unavailable: {0}")]
    Connection(#[source] PlanningError),

    #[error("ERP gateway unavailable: {0}")]
    Gateway(#[source] GatewayError),

    #[error("Counting pending records failed: {0}")]
    Count(#[source] PlanningError),

    #[error("Fetching round {round} failed: {source}")]
    Fetch {
        round: i32,
        #[source]
        source: PlanningError,
    },

    #[error("Authentication failed for round {round}: {source}")]
    Authentication {
        round: i32,
        #[source]
        source: GatewayError,
    },

    #[error("An automation run is already in progress")]
    AlreadyRunning,

    #[error("Automation task failed: {0}")]
    TaskFailed(String),

    #[error("Automation run panicked: {0}")]
    Panicked(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
