//! Planning table access for production-order automation.
//!
//! Reads pending planning records, writes created order ids back, and
//! consolidates a round's orders into a batch through the ERP procedure.
//!
//! Two implementations share the `PlanningRepository` trait:
//! - `PgPlanningRepository`: the real table, through sqlx
//! - `InMemoryPlanningRepository`: simulation mode and tests

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use config::DatabaseConfig;
pub use error::{PlanningError, PlanningResult};
pub use memory::{InMemoryPlanningRepository, RepoCall};
pub use postgres::{PgConnector, PgPlanningRepository};
pub use repository::{BoxFuture, DynPlanningRepository, PlanningConnector, PlanningRepository};
