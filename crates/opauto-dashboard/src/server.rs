//! HTTP server implementation using axum.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use opauto_core::RunParams;
use opauto_engine::{EngineError, RunController, RunSnapshot};
use opauto_telemetry::Metrics;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::types::{ApiResponse, RunRequest};

/// Caps concurrent WebSocket connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

/// Holds one connection slot until dropped.
pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    controller: RunController,
    broadcast_tx: broadcast::Sender<String>,
    connection_limiter: Arc<ConnectionLimiter>,
    config: DashboardConfig,
}

impl AppState {
    pub fn new(
        controller: RunController,
        broadcast_tx: broadcast::Sender<String>,
        config: DashboardConfig,
    ) -> Self {
        Self {
            controller,
            broadcast_tx,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            config,
        }
    }

    pub fn controller(&self) -> &RunController {
        &self.controller
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/automation/reset", post(reset_state))
        .route("/api/automation/verify", post(verify_connections))
        .route("/api/automation/pending", post(count_pending))
        .route("/api/automation/start", post(start_automation))
        .route("/api/automation/summary", get(get_summary))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

fn engine_status(error: &EngineError) -> StatusCode {
    match error {
        EngineError::InvalidParams(_) => StatusCode::BAD_REQUEST,
        EngineError::AlreadyRunning => StatusCode::CONFLICT,
        EngineError::TaskFailed(_) | EngineError::Panicked(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn engine_failure(error: &EngineError) -> Response {
    (engine_status(error), Json(ApiResponse::failed(error.to_string()))).into_response()
}

/// Turn a request body into validated run parameters.
fn run_params(payload: Result<Json<RunRequest>, JsonRejection>) -> Result<RunParams, Response> {
    let Json(request) = payload.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failed(rejection.body_text())),
        )
            .into_response()
    })?;
    request
        .into_params()
        .map_err(|e| engine_failure(&EngineError::InvalidParams(e)))
}

async fn reset_state(State(state): State<AppState>) -> Response {
    match state.controller.reset() {
        Ok(()) => Json(ApiResponse::ok("State reset")).into_response(),
        Err(e) => engine_failure(&e),
    }
}

async fn verify_connections(State(state): State<AppState>) -> Response {
    match state.controller.verify_connections().await {
        Ok(()) => Json(ApiResponse::ok("Database and ERP gateway reachable")).into_response(),
        Err(e) => {
            warn!(error = %e, "Connection check failed");
            engine_failure(&e)
        }
    }
}

async fn count_pending(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let params = match run_params(payload) {
        Ok(params) => params,
        Err(response) => return response,
    };
    match state.controller.count_pending(params).await {
        Ok(total) => {
            debug!(total, line = params.line, "Pending records counted");
            Json(ApiResponse::total(total)).into_response()
        }
        Err(e) => engine_failure(&e),
    }
}

async fn start_automation(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let params = match run_params(payload) {
        Ok(params) => params,
        Err(response) => return response,
    };
    match state.controller.start(params) {
        Ok(run) => {
            info!(run_id = %run.run_id, line = params.line, "Automation started from dashboard");
            (StatusCode::ACCEPTED, Json(ApiResponse::started(run.run_id))).into_response()
        }
        Err(e) => engine_failure(&e),
    }
}

async fn get_summary(State(state): State<AppState>) -> Json<RunSnapshot> {
    Json(state.controller.snapshot())
}

async fn get_metrics() -> Response {
    match Metrics::render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let guard = match state.connection_limiter.try_acquire() {
        Some(guard) => guard,
        None => {
            warn!(
                current = state.connection_limiter.current_count(),
                max = state.config.max_connections,
                "WebSocket connection limit reached"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    };

    // Subscribe before the handshake completes so no event after it is missed.
    let broadcast_rx = state.broadcast_tx.subscribe();

    info!(
        connections = state.connection_limiter.current_count(),
        "New WebSocket connection"
    );

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, broadcast_rx, guard))
}

/// Forward progress events to one WebSocket client until either side closes.
async fn handle_ws_connection(
    socket: WebSocket,
    state: AppState,
    mut broadcast_rx: broadcast::Receiver<String>,
    _guard: ConnectionGuard,
) {
    let (mut sender, mut receiver) = socket.split();

    // Pings are answered by axum; only close and errors matter here.
    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("Client sent close frame");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            debug!("Failed to send message, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "WebSocket client lagged, catching up");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }
            _ = &mut incoming_task => {
                debug!("Incoming task completed, closing connection");
                break;
            }
        }
    }

    incoming_task.abort();
    info!(
        connections = state.connection_limiter.current_count().saturating_sub(1),
        "WebSocket connection closed"
    );
}

/// Run the dashboard HTTP server until `shutdown` resolves.
pub async fn run_server<F>(
    controller: RunController,
    broadcast_tx: broadcast::Sender<String>,
    config: DashboardConfig,
    shutdown: F,
) -> DashboardResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = format!("{}:{}", config.bind_address, config.port);
    let addr: SocketAddr = address
        .parse()
        .map_err(|e: std::net::AddrParseError| DashboardError::BindAddress {
            address: address.clone(),
            reason: e.to_string(),
        })?;

    let app = create_router(AppState::new(controller, broadcast_tx, config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Starting dashboard server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Dashboard server stopped");
    Ok(())
}
