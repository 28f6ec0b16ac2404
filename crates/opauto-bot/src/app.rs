//! Application wiring.
//!
//! Picks the planning and gateway connectors for the configured mode and
//! builds one `RunController` that every front-end shares.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use opauto_core::{RunParams, RunSummary};
use opauto_dashboard::BroadcastSink;
use opauto_engine::{DynProgressSink, FanoutSink, RoundOrchestrator, RunController};
use opauto_gateway::{GatewayConnector, SankhyaConnector, SimulatedConnector};
use opauto_planning::{InMemoryPlanningRepository, PgConnector, PlanningConnector};
use tracing::{info, warn};

use crate::config::{AppConfig, SimulationConfig};
use crate::error::AppResult;

/// Main application.
pub struct Application {
    config: AppConfig,
    controller: RunController,
    broadcast: BroadcastSink,
}

impl Application {
    /// Build the application.
    ///
    /// Progress goes to the dashboard broadcast channel and to every sink in
    /// `extra_sinks`.
    pub fn new(config: AppConfig, extra_sinks: Vec<DynProgressSink>) -> AppResult<Self> {
        config.validate()?;

        let (planning, gateways) = if config.is_simulation() {
            simulation_connectors(&config.simulation)
        } else {
            live_connectors(&config)?
        };

        let broadcast = BroadcastSink::with_capacity(config.dashboard.broadcast_capacity);
        let mut sinks: Vec<DynProgressSink> = vec![Arc::new(broadcast.clone())];
        sinks.extend(extra_sinks);

        let orchestrator = RoundOrchestrator::new(
            planning,
            gateways,
            Arc::new(FanoutSink::new(sinks)),
            config.orders.clone(),
        );

        Ok(Self {
            config,
            controller: RunController::new(Arc::new(orchestrator)),
            broadcast,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    /// Serve the operator dashboard until Ctrl+C.
    pub async fn serve(self) -> AppResult<()> {
        let controller = self.controller.clone();
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        };

        opauto_dashboard::run_server(
            self.controller,
            self.broadcast.sender(),
            self.config.dashboard,
            shutdown,
        )
        .await?;

        if controller.is_running() {
            warn!("Dashboard stopped while a run was still in progress");
        }
        Ok(())
    }

    /// Probe the planning database and the ERP.
    pub async fn check(&self) -> AppResult<()> {
        Ok(self.controller.verify_connections().await?)
    }

    /// Pending records for `params`.
    pub async fn count(&self, params: RunParams) -> AppResult<u64> {
        Ok(self.controller.count_pending(params).await?)
    }

    /// Run in the foreground.
    pub async fn run(&self, params: RunParams) -> AppResult<RunSummary> {
        Ok(self.controller.run(params).await?)
    }
}

fn simulation_connectors(
    simulation: &SimulationConfig,
) -> (Arc<dyn PlanningConnector>, Arc<dyn GatewayConnector>) {
    let today = Local::now().date_naive();
    let lines: RangeInclusive<i32> = 1..=simulation.lines;
    let rounds: RangeInclusive<i32> = 1..=simulation.rounds;
    info!(
        plan_date = %today,
        lines = simulation.lines,
        rounds = simulation.rounds,
        records_per_round = simulation.records_per_round,
        "Simulation mode: generated planning data and simulated ERP"
    );

    let repo =
        InMemoryPlanningRepository::seeded(today, lines, rounds, simulation.records_per_round);
    let gateways = SimulatedConnector::new(
        simulation.first_order_id,
        Duration::from_millis(simulation.latency_ms),
    );
    (Arc::new(repo), Arc::new(gateways))
}

fn live_connectors(
    config: &AppConfig,
) -> AppResult<(Arc<dyn PlanningConnector>, Arc<dyn GatewayConnector>)> {
    info!(
        gateway_url = %config.sankhya.gateway_url,
        "Live mode: planning database and Sankhya gateway"
    );
    let planning = PgConnector::new(config.database.clone())?;
    let gateways = SankhyaConnector::new(config.sankhya.clone());
    Ok((Arc::new(planning), Arc::new(gateways)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use opauto_engine::RecordingSink;

    fn simulation_config(records_per_round: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.simulation.records_per_round = records_per_round;
        config.simulation.rounds = 2;
        config.simulation.lines = 1;
        config.simulation.latency_ms = 0;
        config
    }

    fn today_params(from: i32, to: i32) -> RunParams {
        RunParams::new(Local::now().date_naive(), 1, from, to).unwrap()
    }

    #[test]
    fn test_simulation_counts_generated_records() {
        let app = Application::new(simulation_config(3), Vec::new()).unwrap();

        let total = tokio_test::block_on(app.count(today_params(1, 2))).unwrap();

        assert_eq!(total, 6);
    }

    #[test]
    fn test_simulation_run_creates_every_order() {
        let sink = Arc::new(RecordingSink::new());
        let app = Application::new(simulation_config(2), vec![sink.clone() as DynProgressSink]).unwrap();

        tokio_test::block_on(app.check()).unwrap();
        let summary = tokio_test::block_on(app.run(today_params(1, 2))).unwrap();

        assert_eq!(summary.created_count, 4);
        assert_eq!(summary.failed_count, 0);
        assert_eq!(summary.successes[0].order_id.get(), 900_111);
        assert_eq!(sink.finished_count(), 1);
        assert_eq!(
            tokio_test::block_on(app.count(today_params(1, 2))).unwrap(),
            0
        );
    }

    #[test]
    fn test_live_mode_without_settings_fails_fast() {
        let config = AppConfig {
            mode: Mode::Live,
            ..AppConfig::default()
        };
        assert!(Application::new(config, Vec::new()).is_err());
    }
}
