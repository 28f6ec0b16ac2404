//! RunController single-run gate.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use opauto_core::{PlanId, PlanningRecord, RunParams};
use opauto_engine::{
    EngineError, OrchestratorSettings, RecordingSink, RoundOrchestrator, RunController, RunStatus,
};
use opauto_gateway::{GatewayConnector, OrderGateway, SimulatedGateway};
use opauto_planning::{InMemoryPlanningRepository, PlanningConnector};
use rust_decimal_macros::dec;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 21).unwrap()
}

fn params() -> RunParams {
    RunParams::new(day(), 1, 1, 2).unwrap()
}

fn seeded_repo() -> InMemoryPlanningRepository {
    InMemoryPlanningRepository::new()
        .with_record(day(), 1, PlanningRecord::pending(PlanId(500), "P1", dec!(100), 1))
        .with_record(day(), 1, PlanningRecord::pending(PlanId(501), "P2", dec!(100), 1))
        .with_record(day(), 1, PlanningRecord::pending(PlanId(502), "P3", dec!(100), 2))
}

fn controller(
    repo: &InMemoryPlanningRepository,
    gateway: Arc<SimulatedGateway>,
) -> (RunController, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let planning: Arc<dyn PlanningConnector> = Arc::new(repo.clone());
    let gateways: Arc<dyn GatewayConnector> = Arc::new(gateway);
    let orchestrator = RoundOrchestrator::new(
        planning,
        gateways,
        sink.clone(),
        OrchestratorSettings::default(),
    );
    (RunController::new(Arc::new(orchestrator)), sink)
}

fn slow_gateway() -> Arc<SimulatedGateway> {
    Arc::new(SimulatedGateway::new().with_latency(Duration::from_millis(150)))
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    let repo = seeded_repo();
    let (controller, sink) = controller(&repo, slow_gateway());

    let run = controller.start(params()).unwrap();
    assert_eq!(controller.status(), RunStatus::Running);

    assert!(matches!(
        controller.start(params()),
        Err(EngineError::AlreadyRunning)
    ));
    assert!(matches!(controller.reset(), Err(EngineError::AlreadyRunning)));

    let summary = run.wait().await.unwrap();
    assert_eq!(summary.created_count, 3);
    assert_eq!(controller.status(), RunStatus::Idle);
    assert_eq!(sink.finished_count(), 1);
}

#[tokio::test]
async fn test_summary_visible_mid_run() {
    let repo = seeded_repo();
    let (controller, _sink) = controller(&repo, slow_gateway());

    let run = controller.start(params()).unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    let mid = controller.snapshot();
    assert_eq!(mid.status, RunStatus::Running);
    assert!(mid.summary.created_count < 3);

    run.wait().await.unwrap();
    let done = controller.snapshot();
    assert_eq!(done.status, RunStatus::Idle);
    assert_eq!(done.summary.created_count, 3);
    assert!(done.run_id.is_some());
}

#[tokio::test]
async fn test_can_start_again_after_finish() {
    let repo = seeded_repo();
    let (controller, sink) = controller(&repo, Arc::new(SimulatedGateway::new()));

    controller.start(params()).unwrap().wait().await.unwrap();
    let second = controller.start(params()).unwrap().wait().await.unwrap();

    // Everything was created by the first run.
    assert_eq!(second.created_count, 0);
    assert_eq!(sink.finished_count(), 2);
}

#[tokio::test]
async fn test_halted_run_releases_controller_and_keeps_error() {
    let repo = seeded_repo();
    let gateway = Arc::new(SimulatedGateway::new());
    gateway.fail_login_attempt(1);
    let (controller, sink) = controller(&repo, gateway);

    let result = controller.start(params()).unwrap().wait().await;

    assert!(matches!(result, Err(EngineError::Authentication { round: 1, .. })));
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, RunStatus::Idle);
    assert!(snapshot.last_error.unwrap().contains("Authentication failed"));
    assert_eq!(sink.finished_count(), 1);
}

#[tokio::test]
async fn test_reset_clears_summary() {
    let repo = seeded_repo();
    let (controller, _sink) = controller(&repo, Arc::new(SimulatedGateway::new()));

    controller.run(params()).await.unwrap();
    assert_eq!(controller.summary().created_count, 3);

    controller.reset().unwrap();
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.summary.created_count, 0);
    assert!(snapshot.summary.successes.is_empty());
    assert!(snapshot.run_id.is_none());
}

#[tokio::test]
async fn test_invalid_params_never_claim_the_controller() {
    let repo = seeded_repo();
    let (controller, sink) = controller(&repo, Arc::new(SimulatedGateway::new()));
    let inverted = RunParams {
        plan_date: day(),
        line: 1,
        round_from: 2,
        round_to: 1,
    };

    assert!(matches!(
        controller.start(inverted),
        Err(EngineError::InvalidParams(_))
    ));
    assert_eq!(controller.status(), RunStatus::Idle);
    assert_eq!(sink.finished_count(), 0);
}

#[tokio::test]
async fn test_count_pending_uses_own_connection() {
    let repo = seeded_repo();
    let (controller, _sink) = controller(&repo, Arc::new(SimulatedGateway::new()));

    assert_eq!(controller.count_pending(params()).await.unwrap(), 3);
    assert_eq!(controller.count_pending(params()).await.unwrap(), 3);
    assert_eq!(repo.connections_opened(), 2);
}

#[tokio::test]
async fn test_verify_connections() {
    let repo = seeded_repo();
    let gateway = Arc::new(SimulatedGateway::new());
    let (controller, _sink) = controller(&repo, gateway.clone());

    controller.verify_connections().await.unwrap();
    assert!(!gateway.is_authenticated());

    repo.set_unavailable(true);
    assert!(matches!(
        controller.verify_connections().await,
        Err(EngineError::Connection(_))
    ));
}

#[tokio::test]
async fn test_verify_reports_gateway_failure() {
    let repo = seeded_repo();
    let gateway = Arc::new(SimulatedGateway::new());
    gateway.fail_login_attempt(1);
    let (controller, _sink) = controller(&repo, gateway);

    assert!(matches!(
        controller.verify_connections().await,
        Err(EngineError::Gateway(_))
    ));
}
