//! Core domain types for production-order round automation.
//!
//! This crate provides the types shared by every other crate:
//! - `PlanningRecord`: one pending unit of demand awaiting an order
//! - `PlanId`, `OrderId`, `BatchId`: typed identifiers
//! - `RunParams`: the (date, line, round range) a run is scoped to
//! - `RunSummary`: aggregate outcome of one run
//! - `Severity`, `ProgressEvent`: what the orchestrator reports while it works

pub mod error;
pub mod event;
pub mod planning;
pub mod summary;

pub use error::{CoreError, Result};
pub use event::{ProgressEvent, Severity};
pub use planning::{parse_plan_date, BatchId, OrderId, PlanId, PlanningRecord, RunParams};
pub use summary::{FailureKind, OrderFailure, OrderSuccess, RunSummary};
