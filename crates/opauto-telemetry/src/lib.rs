//! Prometheus metrics and structured logging for production-order automation.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus counters for orders, failures, batches and runs

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
