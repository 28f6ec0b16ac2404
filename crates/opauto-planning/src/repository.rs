//! Planning repository trait.
//!
//! Trait-based so the orchestrator can run against the real planning table,
//! an in-memory table in simulation mode, or test doubles.

use std::pin::Pin;
use std::sync::Arc;

use chrono::NaiveDate;
use opauto_core::{BatchId, OrderId, PlanId, PlanningRecord, RunParams};

use crate::error::PlanningResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Access to the pending-planning records and the batch association.
pub trait PlanningRepository: Send + Sync {
    /// Count pending records for the whole round range.
    ///
    /// Only sizes the progress bar; must not lock rows.
    fn count_pending(&self, params: RunParams) -> BoxFuture<'_, PlanningResult<u64>>;

    /// Pending records of exactly one round, ascending by plan id.
    ///
    /// Empty when nothing matches.
    fn fetch_pending(
        &self,
        plan_date: NaiveDate,
        line: i32,
        round: i32,
    ) -> BoxFuture<'_, PlanningResult<Vec<PlanningRecord>>>;

    /// Write the created order id onto a pending record.
    ///
    /// Returns whether exactly one row changed. `false` means the record
    /// vanished or already had an order.
    fn mark_order_created(
        &self,
        plan_id: PlanId,
        order_id: OrderId,
    ) -> BoxFuture<'_, PlanningResult<bool>>;

    /// Run the ERP batch procedure over `order_ids` and return the batch it
    /// assigned.
    ///
    /// Procedure call and lookup share one transaction; nothing is committed
    /// unless a batch id is found. An empty set fails before any transaction.
    fn consolidate_batch<'a>(
        &'a self,
        order_ids: &'a [OrderId],
        line: i32,
    ) -> BoxFuture<'a, PlanningResult<BatchId>>;

    /// Tag planning records with their batch in one transaction.
    ///
    /// Returns whether at least one row changed.
    fn tag_records_with_batch<'a>(
        &'a self,
        batch_id: BatchId,
        plan_ids: &'a [PlanId],
    ) -> BoxFuture<'a, PlanningResult<bool>>;

    /// Connectivity probe.
    fn ping(&self) -> BoxFuture<'_, PlanningResult<()>>;

    /// Release the underlying connection. Errors are logged, never returned.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Arc wrapper for PlanningRepository trait objects.
pub type DynPlanningRepository = Arc<dyn PlanningRepository>;

/// Opens a repository for one unit of work (a run, a probe, a count).
pub trait PlanningConnector: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, PlanningResult<DynPlanningRepository>>;
}
