//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Input(#[from] opauto_core::CoreError),

    #[error("Planning database error: {0}")]
    Planning(#[from] opauto_planning::PlanningError),

    #[error("ERP gateway error: {0}")]
    Gateway(#[from] opauto_gateway::GatewayError),

    #[error("{0}")]
    Engine(#[from] opauto_engine::EngineError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] opauto_dashboard::DashboardError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] opauto_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
