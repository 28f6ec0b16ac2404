//! Operator dashboard for production-order automation.
//!
//! - REST API to verify connections, count pending records, start a run,
//!   read the run summary and reset it
//! - WebSocket at `/ws` streaming every progress event of the active run
//! - Prometheus text at `/metrics`
//! - Static operator page at `/`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        opauto process                         │
//! │                                                              │
//! │  RunController ──▶ RoundOrchestrator ──▶ FanoutSink           │
//! │       ▲                                   │        │          │
//! │       │                          ConsoleSink   BroadcastSink  │
//! │       │                                            │          │
//! │  ┌────┴──────────────────────────────┐   broadcast::Sender    │
//! │  │ axum HTTP server                  │◀──────────┘            │
//! │  │  POST /api/automation/*           │                        │
//! │  │  GET  /api/automation/summary     │                        │
//! │  │  GET  /ws  → live ProgressEvents  │                        │
//! │  └───────────────────────────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod broadcast;
mod config;
mod error;
mod server;
mod types;

pub use broadcast::BroadcastSink;
pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{create_router, run_server, AppState, ConnectionLimiter};
pub use types::{ApiResponse, RunRequest};
