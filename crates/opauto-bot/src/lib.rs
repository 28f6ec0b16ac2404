//! Production-order round automation.
//!
//! Wires the planning database, the ERP gateway and the orchestrator together
//! and exposes them two ways:
//! - `serve`: operator dashboard (REST + WebSocket)
//! - `run`, `check`, `count`: console front-end for a single run

pub mod app;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;

pub use app::Application;
pub use cli::{Args, Command, RangeArgs, RunArgs};
pub use config::{AppConfig, Mode, SimulationConfig, TelemetryConfig};
pub use console::{render_summary, ConsoleSink};
pub use error::{AppError, AppResult};
