//! In-memory planning repository.
//!
//! Backs simulation mode and the orchestrator tests. Mirrors the table
//! semantics of the Postgres repository (pending filter, ascending order,
//! single-row write-back, all-or-nothing batch consolidation) and records
//! every call so tests can assert on ordering and arguments.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::NaiveDate;
use opauto_core::{BatchId, OrderId, PlanId, PlanningRecord, RunParams};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{PlanningError, PlanningResult};
use crate::repository::{BoxFuture, DynPlanningRepository, PlanningConnector, PlanningRepository};

/// First plan id handed out by [`InMemoryPlanningRepository::seeded`].
const SEED_FIRST_PLAN_ID: i64 = 500;
/// First batch id assigned by the in-memory batch procedure.
const FIRST_BATCH_ID: i64 = 7_001;
/// Oldest calls are dropped beyond this, so a long-lived simulation table
/// stays bounded.
const MAX_RECORDED_CALLS: usize = 4_096;

/// A repository call as seen by the in-memory table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCall {
    CountPending(RunParams),
    FetchPending { round: i32 },
    MarkOrderCreated { plan_id: PlanId, order_id: OrderId },
    ConsolidateBatch { order_ids: Vec<OrderId>, line: i32 },
    TagRecords { batch_id: BatchId, plan_ids: Vec<PlanId> },
    Ping,
    Close,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    record: PlanningRecord,
    plan_date: NaiveDate,
    line: i32,
}

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<PlanId, StoredRecord>,
    /// Process-instance side of the batch procedure (order -> batch).
    order_batches: HashMap<OrderId, BatchId>,
    next_batch_id: i64,

    lose_updates_for: HashSet<PlanId>,
    fail_mark_for: HashSet<PlanId>,
    fail_fetch_for: HashSet<i32>,
    fail_batch: bool,
    fail_tag: bool,
    lose_tag: bool,
    unavailable: bool,

    calls: VecDeque<RepoCall>,
    transactions_started: u64,
    connections_opened: u64,
}

impl Inner {
    fn record_call(&mut self, call: RepoCall) {
        if self.calls.len() == MAX_RECORDED_CALLS {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }
}

/// Planning table held in memory.
///
/// Cloning shares the table, so a clone handed to a connector and the
/// original used for assertions see the same rows.
#[derive(Debug, Clone)]
pub struct InMemoryPlanningRepository {
    inner: Arc<Mutex<Inner>>,
}

impl Default for InMemoryPlanningRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlanningRepository {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_batch_id: FIRST_BATCH_ID,
                ..Inner::default()
            })),
        }
    }

    /// Generate pending records for every line and round.
    ///
    /// Quantities step by 50 starting at 100 within a round; product codes
    /// encode round and position (`PROD1002` is round 1, second record).
    pub fn seeded(
        plan_date: NaiveDate,
        lines: RangeInclusive<i32>,
        rounds: RangeInclusive<i32>,
        records_per_round: u32,
    ) -> Self {
        let repo = Self::new();
        let mut plan_id = SEED_FIRST_PLAN_ID;
        for line in lines {
            for round in rounds.clone() {
                for i in 0..records_per_round {
                    let qty = Decimal::from(100 + i64::from(i) * 50);
                    let product = format!("PROD{round}{:03}", i + 1);
                    repo.insert(
                        plan_date,
                        line,
                        PlanningRecord::pending(PlanId::new(plan_id), product, qty, round),
                    );
                    plan_id += 1;
                }
            }
        }
        info!(records = plan_id - SEED_FIRST_PLAN_ID, "Seeded in-memory planning table");
        repo
    }

    /// Insert or replace a planning row.
    pub fn insert(&self, plan_date: NaiveDate, line: i32, record: PlanningRecord) {
        self.inner.lock().rows.insert(
            record.plan_id,
            StoredRecord {
                record,
                plan_date,
                line,
            },
        );
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_record(self, plan_date: NaiveDate, line: i32, record: PlanningRecord) -> Self {
        self.insert(plan_date, line, record);
        self
    }

    /// Write-back for this record affects zero rows.
    pub fn lose_update_for(&self, plan_id: PlanId) {
        self.inner.lock().lose_updates_for.insert(plan_id);
    }

    /// Write-back for this record fails with a database error.
    pub fn fail_mark_for(&self, plan_id: PlanId) {
        self.inner.lock().fail_mark_for.insert(plan_id);
    }

    /// Fetching this round fails with a database error.
    pub fn fail_fetch_for(&self, round: i32) {
        self.inner.lock().fail_fetch_for.insert(round);
    }

    /// The batch procedure assigns nothing, so the lookup finds no batch.
    pub fn set_fail_batch(&self, fail: bool) {
        self.inner.lock().fail_batch = fail;
    }

    /// Batch tag-back fails with a database error.
    pub fn set_fail_tag(&self, fail: bool) {
        self.inner.lock().fail_tag = fail;
    }

    /// Batch tag-back succeeds but touches no row.
    pub fn set_lose_tag(&self, lose: bool) {
        self.inner.lock().lose_tag = lose;
    }

    /// Every call (and connect) fails as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    /// Current state of a row.
    pub fn record(&self, plan_id: PlanId) -> Option<PlanningRecord> {
        self.inner
            .lock()
            .rows
            .get(&plan_id)
            .map(|stored| stored.record.clone())
    }

    /// All rows, ascending by plan id.
    pub fn records(&self) -> Vec<PlanningRecord> {
        self.inner
            .lock()
            .rows
            .values()
            .map(|stored| stored.record.clone())
            .collect()
    }

    /// Batch the procedure assigned to an order, if any.
    pub fn batch_of_order(&self, order_id: OrderId) -> Option<BatchId> {
        self.inner.lock().order_batches.get(&order_id).copied()
    }

    /// Recorded calls, in order, up to the most recent `MAX_RECORDED_CALLS`.
    pub fn calls(&self) -> Vec<RepoCall> {
        self.inner.lock().calls.iter().cloned().collect()
    }

    pub fn transactions_started(&self) -> u64 {
        self.inner.lock().transactions_started
    }

    pub fn connections_opened(&self) -> u64 {
        self.inner.lock().connections_opened
    }

    fn check_available(inner: &Inner) -> PlanningResult<()> {
        if inner.unavailable {
            Err(PlanningError::Unavailable(
                "in-memory planning table marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn matches(stored: &StoredRecord, plan_date: NaiveDate, line: i32) -> bool {
        stored.record.is_pending() && stored.plan_date == plan_date && stored.line == line
    }
}

impl PlanningRepository for InMemoryPlanningRepository {
    fn count_pending(&self, params: RunParams) -> BoxFuture<'_, PlanningResult<u64>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            inner.record_call(RepoCall::CountPending(params));
            Self::check_available(&inner)?;

            let rounds = params.rounds();
            let count = inner
                .rows
                .values()
                .filter(|s| Self::matches(s, params.plan_date, params.line))
                .filter(|s| rounds.contains(&s.record.round))
                .count() as u64;
            debug!(count, "Counted pending in-memory records");
            Ok(count)
        })
    }

    fn fetch_pending(
        &self,
        plan_date: NaiveDate,
        line: i32,
        round: i32,
    ) -> BoxFuture<'_, PlanningResult<Vec<PlanningRecord>>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            inner.record_call(RepoCall::FetchPending { round });
            Self::check_available(&inner)?;
            if inner.fail_fetch_for.contains(&round) {
                return Err(PlanningError::Unavailable(format!(
                    "fetch for round {round} failed"
                )));
            }

            // BTreeMap iteration keeps plan ids ascending.
            let records: Vec<PlanningRecord> = inner
                .rows
                .values()
                .filter(|s| Self::matches(s, plan_date, line) && s.record.round == round)
                .map(|s| s.record.clone())
                .collect();
            Ok(records)
        })
    }

    fn mark_order_created(
        &self,
        plan_id: PlanId,
        order_id: OrderId,
    ) -> BoxFuture<'_, PlanningResult<bool>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            inner.record_call(RepoCall::MarkOrderCreated { plan_id, order_id });
            Self::check_available(&inner)?;
            if inner.fail_mark_for.contains(&plan_id) {
                return Err(PlanningError::Unavailable(format!(
                    "update of plan {plan_id} failed"
                )));
            }
            if inner.lose_updates_for.contains(&plan_id) {
                warn!(%plan_id, "Simulated lost update");
                return Ok(false);
            }

            match inner.rows.get_mut(&plan_id) {
                Some(stored) if stored.record.is_pending() => {
                    stored.record.order_id = Some(order_id);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn consolidate_batch<'a>(
        &'a self,
        order_ids: &'a [OrderId],
        line: i32,
    ) -> BoxFuture<'a, PlanningResult<BatchId>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            inner.record_call(RepoCall::ConsolidateBatch {
                order_ids: order_ids.to_vec(),
                line,
            });
            if order_ids.is_empty() {
                return Err(PlanningError::EmptyOrderSet);
            }
            Self::check_available(&inner)?;
            inner.transactions_started += 1;

            let csv = order_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            if inner.fail_batch {
                // Nothing written, same as a rolled back transaction.
                return Err(PlanningError::BatchNotFound { order_ids: csv });
            }

            let batch_id = BatchId::new(inner.next_batch_id);
            inner.next_batch_id += 1;
            for order_id in order_ids {
                inner.order_batches.insert(*order_id, batch_id);
            }
            info!(%batch_id, orders = %csv, "In-memory batch consolidated");
            Ok(batch_id)
        })
    }

    fn tag_records_with_batch<'a>(
        &'a self,
        batch_id: BatchId,
        plan_ids: &'a [PlanId],
    ) -> BoxFuture<'a, PlanningResult<bool>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            inner.record_call(RepoCall::TagRecords {
                batch_id,
                plan_ids: plan_ids.to_vec(),
            });
            if plan_ids.is_empty() {
                return Ok(false);
            }
            Self::check_available(&inner)?;
            inner.transactions_started += 1;
            if inner.fail_tag {
                return Err(PlanningError::Unavailable(
                    "batch tag-back failed".to_string(),
                ));
            }
            if inner.lose_tag {
                return Ok(false);
            }

            let mut touched = 0usize;
            for plan_id in plan_ids {
                if let Some(stored) = inner.rows.get_mut(plan_id) {
                    stored.record.batch_id = Some(batch_id);
                    touched += 1;
                }
            }
            Ok(touched > 0)
        })
    }

    fn ping(&self) -> BoxFuture<'_, PlanningResult<()>> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            inner.record_call(RepoCall::Ping);
            Self::check_available(&inner)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.inner.lock().record_call(RepoCall::Close);
        })
    }
}

impl PlanningConnector for InMemoryPlanningRepository {
    fn connect(&self) -> BoxFuture<'_, PlanningResult<DynPlanningRepository>> {
        Box::pin(async move {
            {
                let mut inner = self.inner.lock();
                Self::check_available(&inner)?;
                inner.connections_opened += 1;
            }
            Ok(Arc::new(self.clone()) as DynPlanningRepository)
        })
    }
}
