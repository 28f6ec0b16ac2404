//! Round orchestrator.
//!
//! Drives one automation run: for each round, open an ERP session, turn every
//! pending planning record into a production order, write the order id back,
//! then consolidate the round's orders into a batch.
//!
//! Per-record failures are recorded and skipped. Authentication failure and
//! database errors while counting or fetching halt the run. Either way the
//! run ends with session logout, connection close and exactly one
//! `finished` event.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use opauto_core::{
    FailureKind, OrderId, PlanId, PlanningRecord, RunParams, RunSummary, Severity,
};
use opauto_gateway::{DynOrderGateway, GatewayConnector, OrderGateway, OrderRequest};
use opauto_planning::{DynPlanningRepository, PlanningConnector, PlanningRepository};
use opauto_telemetry::Metrics;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::sink::DynProgressSink;

/// Run summary shared between the running task and status readers.
pub type SharedSummary = Arc<RwLock<RunSummary>>;

/// Order-creation settings fixed for every record.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    /// Production process the orders are created under (IDPROC).
    #[serde(default = "default_process_id")]
    pub process_id: i64,
    /// Production plan (CODPLP).
    #[serde(default = "default_plp_id")]
    pub plp_id: i64,
    /// Pause between records, 0 to disable.
    #[serde(default)]
    pub record_delay_ms: u64,
}

fn default_process_id() -> i64 {
    51
}

fn default_plp_id() -> i64 {
    1
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            process_id: default_process_id(),
            plp_id: default_plp_id(),
            record_delay_ms: 0,
        }
    }
}

impl OrchestratorSettings {
    pub fn record_delay(&self) -> Duration {
        Duration::from_millis(self.record_delay_ms)
    }
}

/// What happened to one record.
enum RecordOutcome {
    Created(OrderId),
    /// Order exists in the ERP, planning row not updated.
    Diverged { order_id: OrderId, reason: String },
    Failed(String),
}

/// Connections opened by a run, released at cleanup.
#[derive(Default)]
struct RunResources {
    repo: Option<DynPlanningRepository>,
    gateway: Option<DynOrderGateway>,
}

/// Orders created in the current round, for batch consolidation.
#[derive(Default)]
struct RoundAccumulator {
    order_ids: Vec<OrderId>,
    plan_ids: Vec<PlanId>,
}

/// Drives automation runs.
pub struct RoundOrchestrator {
    planning: Arc<dyn PlanningConnector>,
    gateways: Arc<dyn GatewayConnector>,
    sink: DynProgressSink,
    settings: OrchestratorSettings,
}

impl RoundOrchestrator {
    pub fn new(
        planning: Arc<dyn PlanningConnector>,
        gateways: Arc<dyn GatewayConnector>,
        sink: DynProgressSink,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            planning,
            gateways,
            sink,
            settings,
        }
    }

    pub fn planning(&self) -> &Arc<dyn PlanningConnector> {
        &self.planning
    }

    pub fn gateways(&self) -> &Arc<dyn GatewayConnector> {
        &self.gateways
    }

    /// Run the automation over `params`.
    ///
    /// `summary` is reset at start and updated after every record. Cleanup
    /// and the `finished` event happen whether the run halts or panics; a
    /// halt is returned as the error.
    pub async fn run_automation(
        &self,
        params: RunParams,
        summary: &SharedSummary,
    ) -> EngineResult<RunSummary> {
        *summary.write() = RunSummary::new();
        Metrics::run_started();
        info!(
            plan_date = %params.plan_date,
            line = params.line,
            round_from = params.round_from,
            round_to = params.round_to,
            "Automation run starting"
        );

        let mut resources = RunResources::default();
        let result = AssertUnwindSafe(self.run_rounds(params, summary, &mut resources))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(EngineError::Panicked(panic_message(panic.as_ref()))));

        // Cleanup
        if let Some(gateway) = resources.gateway {
            gateway.logout().await;
        }
        if let Some(repo) = resources.repo {
            repo.close().await;
        }

        let outcome = match &result {
            Ok(()) => "completed",
            Err(e) => {
                self.log(&format!("Automation halted: {e}"), Severity::Error);
                "halted"
            }
        };

        let final_summary = summary.read().clone();
        self.log(
            &format!(
                "Automation finished: {} created, {} failed",
                final_summary.created_count, final_summary.failed_count
            ),
            Severity::Info,
        );
        self.sink.finished();
        Metrics::run_finished(outcome);

        result.map(|()| final_summary)
    }

    async fn run_rounds(
        &self,
        params: RunParams,
        summary: &SharedSummary,
        resources: &mut RunResources,
    ) -> EngineResult<()> {
        params.validate()?;

        let repo = self
            .planning
            .connect()
            .await
            .map_err(EngineError::Connection)?;
        resources.repo = Some(repo.clone());

        let total = repo
            .count_pending(params)
            .await
            .map_err(EngineError::Count)?;
        self.sink.progress(0, total);
        self.log(
            &format!(
                "{total} pending records for {} line {} rounds {} to {}",
                params.plan_date, params.line, params.round_from, params.round_to
            ),
            Severity::Info,
        );

        let gateway = self.gateways.open().map_err(EngineError::Gateway)?;
        resources.gateway = Some(gateway.clone());

        for round in params.rounds() {
            self.log(&format!("Round {round} started"), Severity::Info);
            self.emit_counters(summary, round);

            if let Err(source) = gateway.authenticate().await {
                return Err(EngineError::Authentication { round, source });
            }

            let result = self
                .run_round(repo.as_ref(), gateway.as_ref(), params, round, total, summary)
                .await;
            // Sessions never outlive their round.
            gateway.logout().await;
            result?;
        }

        Ok(())
    }

    async fn run_round(
        &self,
        repo: &dyn PlanningRepository,
        gateway: &dyn OrderGateway,
        params: RunParams,
        round: i32,
        total: u64,
        summary: &SharedSummary,
    ) -> EngineResult<()> {
        let records = repo
            .fetch_pending(params.plan_date, params.line, round)
            .await
            .map_err(|source| EngineError::Fetch { round, source })?;

        if records.is_empty() {
            self.log(
                &format!("No pending records for round {round}"),
                Severity::Warning,
            );
            return Ok(());
        }
        self.log(
            &format!("Round {round}: {} records to process", records.len()),
            Severity::Info,
        );

        let mut created = RoundAccumulator::default();
        let delay = self.settings.record_delay();

        let count = records.len();
        for (index, record) in records.iter().enumerate() {
            self.log(
                &format!(
                    "[{}/{count}] round {round}: processing plan {}",
                    index + 1,
                    record.plan_id
                ),
                Severity::Info,
            );
            let outcome = AssertUnwindSafe(self.process_record(repo, gateway, record))
                .catch_unwind()
                .await;
            self.apply_outcome(record, outcome, summary, &mut created);

            self.emit_counters(summary, round);
            let processed = summary.read().processed();
            self.sink.progress(processed, total);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        if !created.order_ids.is_empty() {
            self.consolidate(repo, &created, params.line, round).await;
        }
        Ok(())
    }

    async fn process_record(
        &self,
        repo: &dyn PlanningRepository,
        gateway: &dyn OrderGateway,
        record: &PlanningRecord,
    ) -> RecordOutcome {
        let request = OrderRequest {
            product_code: record.product_code.clone(),
            process_id: self.settings.process_id,
            plp_id: self.settings.plp_id,
            lot_size: record.planned_qty,
        };
        debug!(
            plan_id = %record.plan_id,
            product = %record.product_code,
            qty = %record.planned_qty,
            "Creating production order"
        );

        let started = Instant::now();
        let order_id = match gateway.create_order(&request).await {
            Ok(order_id) => {
                Metrics::order_created(started.elapsed().as_secs_f64() * 1000.0);
                order_id
            }
            Err(e) => {
                Metrics::order_create_failed(started.elapsed().as_secs_f64() * 1000.0);
                return RecordOutcome::Failed(e.to_string());
            }
        };

        match repo.mark_order_created(record.plan_id, order_id).await {
            Ok(true) => RecordOutcome::Created(order_id),
            Ok(false) => RecordOutcome::Diverged {
                order_id,
                reason: "no planning row updated".to_string(),
            },
            Err(e) => RecordOutcome::Diverged {
                order_id,
                reason: e.to_string(),
            },
        }
    }

    fn apply_outcome(
        &self,
        record: &PlanningRecord,
        outcome: Result<RecordOutcome, Box<dyn Any + Send>>,
        summary: &SharedSummary,
        created: &mut RoundAccumulator,
    ) {
        let plan_id = record.plan_id;
        let (kind, message) = match outcome {
            Ok(RecordOutcome::Created(order_id)) => {
                summary.write().record_success(plan_id, order_id);
                created.order_ids.push(order_id);
                created.plan_ids.push(plan_id);
                self.log(
                    &format!("Plan {plan_id}: order {order_id} created"),
                    Severity::Success,
                );
                return;
            }
            Ok(RecordOutcome::Diverged { order_id, reason }) => (
                FailureKind::Divergence,
                format!("order {order_id} created but database not updated ({reason})"),
            ),
            Ok(RecordOutcome::Failed(reason)) => (
                FailureKind::Gateway,
                format!("order creation failed: {reason}"),
            ),
            Err(panic) => (
                FailureKind::Unexpected,
                format!("unexpected error: {}", panic_message(panic.as_ref())),
            ),
        };

        Metrics::order_failure(kind.as_str());
        self.log(&format!("Plan {plan_id}: {message}"), Severity::Error);
        summary.write().record_failure(plan_id, kind, message);
    }

    async fn consolidate(
        &self,
        repo: &dyn PlanningRepository,
        created: &RoundAccumulator,
        line: i32,
        round: i32,
    ) {
        let batch_id = match repo.consolidate_batch(&created.order_ids, line).await {
            Ok(batch_id) => {
                Metrics::batch("consolidated");
                self.log(
                    &format!(
                        "Round {round}: batch {batch_id} generated for {} orders",
                        created.order_ids.len()
                    ),
                    Severity::Success,
                );
                batch_id
            }
            Err(e) => {
                Metrics::batch("failed");
                self.log(
                    &format!("Round {round}: batch generation failed: {e}"),
                    Severity::Error,
                );
                return;
            }
        };

        match repo
            .tag_records_with_batch(batch_id, &created.plan_ids)
            .await
        {
            Ok(true) => self.log(
                &format!(
                    "Round {round}: batch {batch_id} written to {} planning records",
                    created.plan_ids.len()
                ),
                Severity::Success,
            ),
            Ok(false) => {
                Metrics::batch("untagged");
                self.log(
                    &format!("Round {round}: batch {batch_id} generated but no planning record was tagged"),
                    Severity::Error,
                );
            }
            Err(e) => {
                Metrics::batch("untagged");
                self.log(
                    &format!("Round {round}: batch {batch_id} generated but tagging planning records failed: {e}"),
                    Severity::Error,
                );
            }
        }
    }

    fn emit_counters(&self, summary: &SharedSummary, round: i32) {
        let (created, failed) = {
            let s = summary.read();
            (s.created_count, s.failed_count)
        };
        self.sink.counters(created, failed, round);
    }

    /// Report to the sink and mirror to tracing.
    fn log(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => info!(target: "opauto::run", "{message}"),
            Severity::Warning => warn!(target: "opauto::run", "{message}"),
            Severity::Error => error!(target: "opauto::run", "{message}"),
        }
        self.sink.log(message, severity);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = OrchestratorSettings::default();
        assert_eq!(settings.process_id, 51);
        assert_eq!(settings.plp_id, 1);
        assert!(settings.record_delay().is_zero());
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(boxed.as_ref()), "owned boom");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "panic with non-string payload");
    }
}
