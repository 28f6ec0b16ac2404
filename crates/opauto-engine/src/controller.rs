//! Run controller.
//!
//! Owns the `{Idle, Running}` status of the process. A start flips the status
//! to `Running` before the background task is spawned; a drop guard inside
//! the task flips it back once the run, cleanup included, is over, even if
//! the task panics. A second start while running is rejected, never queued.

use std::sync::Arc;

use opauto_core::{RunParams, RunSummary};
use opauto_planning::PlanningConnector;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::orchestrator::{RoundOrchestrator, SharedSummary};

/// Whether a run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
}

#[derive(Debug)]
struct ControllerState {
    status: RunStatus,
    run_id: Option<Uuid>,
    params: Option<RunParams>,
    last_error: Option<String>,
}

/// Point-in-time view for status readers.
///
/// Taken without snapshot isolation: counters may move between two reads.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub run_id: Option<Uuid>,
    pub params: Option<RunParams>,
    pub last_error: Option<String>,
    pub summary: RunSummary,
}

/// Handle to a run started in the background.
pub struct StartedRun {
    pub run_id: Uuid,
    handle: JoinHandle<EngineResult<RunSummary>>,
}

impl StartedRun {
    /// Wait for the run to end.
    pub async fn wait(self) -> EngineResult<RunSummary> {
        self.handle
            .await
            .map_err(|e| EngineError::TaskFailed(e.to_string()))?
    }
}

/// Returns the controller to `Idle` when dropped.
struct RunningGuard {
    state: Arc<Mutex<ControllerState>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.status = RunStatus::Idle;
        info!(run_id = ?state.run_id, "Automation run released");
    }
}

/// Single-run gate around a [`RoundOrchestrator`].
#[derive(Clone)]
pub struct RunController {
    orchestrator: Arc<RoundOrchestrator>,
    state: Arc<Mutex<ControllerState>>,
    summary: SharedSummary,
}

impl RunController {
    pub fn new(orchestrator: Arc<RoundOrchestrator>) -> Self {
        Self {
            orchestrator,
            state: Arc::new(Mutex::new(ControllerState {
                status: RunStatus::Idle,
                run_id: None,
                params: None,
                last_error: None,
            })),
            summary: Arc::new(RwLock::new(RunSummary::new())),
        }
    }

    pub fn orchestrator(&self) -> &Arc<RoundOrchestrator> {
        &self.orchestrator
    }

    pub fn status(&self) -> RunStatus {
        self.state.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == RunStatus::Running
    }

    /// Current summary; may be mid-run.
    pub fn summary(&self) -> RunSummary {
        self.summary.read().clone()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let (status, run_id, params, last_error) = {
            let state = self.state.lock();
            (
                state.status,
                state.run_id,
                state.params,
                state.last_error.clone(),
            )
        };
        RunSnapshot {
            status,
            run_id,
            params,
            last_error,
            summary: self.summary(),
        }
    }

    /// Claim the controller for a new run.
    fn claim(&self, params: RunParams) -> EngineResult<(Uuid, RunningGuard)> {
        params.validate()?;

        let mut state = self.state.lock();
        if state.status == RunStatus::Running {
            warn!(run_id = ?state.run_id, "Start rejected, a run is already in progress");
            return Err(EngineError::AlreadyRunning);
        }
        let run_id = Uuid::new_v4();
        state.status = RunStatus::Running;
        state.run_id = Some(run_id);
        state.params = Some(params);
        state.last_error = None;
        drop(state);

        info!(%run_id, "Automation run claimed");
        Ok((
            run_id,
            RunningGuard {
                state: self.state.clone(),
            },
        ))
    }

    fn record_result(&self, result: &EngineResult<RunSummary>) {
        if let Err(e) = result {
            error!(error = %e, "Automation run halted");
            self.state.lock().last_error = Some(e.to_string());
        }
    }

    /// Start a run in the background.
    ///
    /// Fails with `AlreadyRunning` while another run is active.
    pub fn start(&self, params: RunParams) -> EngineResult<StartedRun> {
        let (run_id, guard) = self.claim(params)?;
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let result = controller
                .orchestrator
                .run_automation(params, &controller.summary)
                .await;
            controller.record_result(&result);
            result
        });

        Ok(StartedRun { run_id, handle })
    }

    /// Run in the foreground under the same single-run gate.
    pub async fn run(&self, params: RunParams) -> EngineResult<RunSummary> {
        let (_run_id, _guard) = self.claim(params)?;
        let result = self
            .orchestrator
            .run_automation(params, &self.summary)
            .await;
        self.record_result(&result);
        result
    }

    /// Clear the summary. Rejected while a run is active.
    pub fn reset(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.status == RunStatus::Running {
            return Err(EngineError::AlreadyRunning);
        }
        *self.summary.write() = RunSummary::new();
        state.run_id = None;
        state.params = None;
        state.last_error = None;
        info!("Automation state reset");
        Ok(())
    }

    /// Probe the planning database, then the ERP gateway.
    ///
    /// Uses connections of its own, so it is safe while a run is active.
    pub async fn verify_connections(&self) -> EngineResult<()> {
        let repo = self
            .orchestrator
            .planning()
            .connect()
            .await
            .map_err(EngineError::Connection)?;
        let ping = repo.ping().await;
        repo.close().await;
        ping.map_err(EngineError::Connection)?;

        let gateway = self
            .orchestrator
            .gateways()
            .open()
            .map_err(EngineError::Gateway)?;
        gateway
            .test_connection()
            .await
            .map_err(EngineError::Gateway)?;

        info!("Database and ERP gateway reachable");
        Ok(())
    }

    /// Count pending records on a connection of its own.
    pub async fn count_pending(&self, params: RunParams) -> EngineResult<u64> {
        params.validate()?;
        let planning: &Arc<dyn PlanningConnector> = self.orchestrator.planning();
        let repo = planning.connect().await.map_err(EngineError::Connection)?;
        let count = repo.count_pending(params).await;
        repo.close().await;
        count.map_err(EngineError::Count)
    }
}
