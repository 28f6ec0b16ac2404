//! Live progress over a real WebSocket connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures_util::StreamExt;
use opauto_core::{PlanId, PlanningRecord, ProgressEvent, RunParams, Severity};
use opauto_dashboard::{create_router, AppState, BroadcastSink, DashboardConfig};
use opauto_engine::{OrchestratorSettings, RoundOrchestrator, RunController};
use opauto_gateway::{GatewayConnector, SimulatedGateway};
use opauto_planning::{InMemoryPlanningRepository, PlanningConnector};
use rust_decimal_macros::dec;
use tokio_tungstenite::tungstenite::Message;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 21).unwrap()
}

async fn serve(max_connections: usize) -> (SocketAddr, RunController) {
    let repo = InMemoryPlanningRepository::new()
        .with_record(day(), 2, PlanningRecord::pending(PlanId(500), "P1", dec!(100), 1))
        .with_record(day(), 2, PlanningRecord::pending(PlanId(501), "P2", dec!(100), 1));
    let sink = BroadcastSink::with_capacity(64);
    let planning: Arc<dyn PlanningConnector> = Arc::new(repo);
    let gateways: Arc<dyn GatewayConnector> = Arc::new(Arc::new(SimulatedGateway::new()));
    let orchestrator = RoundOrchestrator::new(
        planning,
        gateways,
        Arc::new(sink.clone()),
        OrchestratorSettings::default(),
    );
    let controller = RunController::new(Arc::new(orchestrator));
    let config = DashboardConfig {
        max_connections,
        ..DashboardConfig::default()
    };
    let app = create_router(AppState::new(controller.clone(), sink.sender(), config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, controller)
}

#[tokio::test]
async fn test_client_receives_run_progress_until_finished() {
    let (addr, controller) = serve(4).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    controller
        .start(RunParams::new(day(), 2, 1, 1).unwrap())
        .unwrap();

    let mut events = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("progress event in time")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            let event: ProgressEvent = serde_json::from_str(&text).unwrap();
            let done = event == ProgressEvent::ProcessFinished;
            events.push(event);
            if done {
                break;
            }
        }
    }

    assert!(events.contains(&ProgressEvent::ProgressBarUpdate { current: 0, total: 2 }));
    assert!(events.contains(&ProgressEvent::ProgressBarUpdate { current: 2, total: 2 }));
    assert!(events.contains(&ProgressEvent::CountersUpdate {
        created: 2,
        failed: 0,
        current_round: 1,
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::LogUpdate { severity: Severity::Success, .. }
    )));
    assert_eq!(events.last(), Some(&ProgressEvent::ProcessFinished));
}

#[tokio::test]
async fn test_connection_limit_refuses_extra_clients() {
    let (addr, _controller) = serve(1).await;
    let url = format!("ws://{addr}/ws");

    let (first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());

    drop(first);
    let mut reconnected = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Ok((ws, _)) = tokio_tungstenite::connect_async(url.as_str()).await {
            reconnected = Some(ws);
            break;
        }
    }
    assert!(reconnected.is_some());
}
