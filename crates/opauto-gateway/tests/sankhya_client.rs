//! SankhyaClient against an in-process mock of the Sankhya gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use opauto_core::OrderId;
use opauto_gateway::{GatewayError, OrderGateway, OrderRequest, OrderStep, SankhyaClient, SankhyaConfig};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// One request received by the mock gateway.
#[derive(Debug, Clone)]
struct Received {
    service: String,
    query: HashMap<String, String>,
    authorization: Option<String>,
    body: Value,
}

#[derive(Default)]
struct Script {
    refuse_login: bool,
    reject_insert: Option<String>,
    reject_validation: bool,
    launch_as_array: bool,
    launch_nothing: bool,
    slow_launch: Option<Duration>,
    fail_logout: bool,
}

#[derive(Clone, Default)]
struct MockState {
    received: Arc<Mutex<Vec<Received>>>,
    logins: Arc<Mutex<Vec<HashMap<String, String>>>>,
    script: Arc<Mutex<Script>>,
}

struct MockSankhya {
    state: MockState,
    base: String,
}

impl MockSankhya {
    async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/login", post(login))
            .route("/gateway", post(gateway))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            base: format!("http://{addr}"),
        }
    }

    fn config(&self) -> SankhyaConfig {
        SankhyaConfig {
            login_url: format!("{}/login", self.base),
            gateway_url: format!("{}/gateway", self.base),
            app_key: "app-key".to_string(),
            client_token: "client-token".to_string(),
            username: "svc".to_string(),
            password: "secret".to_string(),
            mge_session: "mge-1".to_string(),
            request_timeout_ms: 2_000,
            logout_timeout_ms: 500,
            ..SankhyaConfig::default()
        }
    }

    fn client(&self) -> SankhyaClient {
        SankhyaClient::new(self.config()).unwrap()
    }

    fn services(&self) -> Vec<String> {
        self.state
            .received
            .lock()
            .iter()
            .map(|r| r.service.clone())
            .collect()
    }

    fn received(&self) -> Vec<Received> {
        self.state.received.lock().clone()
    }
}

async fn login(State(state): State<MockState>, headers: HeaderMap) -> Json<Value> {
    let seen: HashMap<String, String> = ["token", "appkey", "username", "password"]
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();
    state.logins.lock().push(seen);

    if state.script.lock().refuse_login {
        Json(json!({"status": "0", "statusMessage": "Usuário ou senha inválidos"}))
    } else {
        Json(json!({"bearerToken": "bearer-abc"}))
    }
}

async fn gateway(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let service = query.get("serviceName").cloned().unwrap_or_default();
    state.received.lock().push(Received {
        service: service.clone(),
        query: query.clone(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    let (reject_insert, reject_validation, launch_as_array, launch_nothing, slow_launch, fail_logout) = {
        let script = state.script.lock();
        (
            script.reject_insert.clone(),
            script.reject_validation,
            script.launch_as_array,
            script.launch_nothing,
            script.slow_launch,
            script.fail_logout,
        )
    };

    let reply = match service.as_str() {
        "LancamentoOrdemProducaoSP.getNovoLancamentoOP" => {
            json!({"status": "1", "responseBody": {"lancamento": {"nulop": "3301"}}})
        }
        "LancamentoOrdemProducaoSP.inserirProdutoHTML5" => match reject_insert {
            Some(message) => json!({"status": "0", "statusMessage": message}),
            None => json!({"status": "1", "responseBody": {}}),
        },
        "LancamentoOrdemProducaoSP.validarTamanhoLote" => {
            if reject_validation {
                json!({"status": "0", "statusMessage": "Lote fora do múltiplo ideal"})
            } else {
                json!({"status": "1"})
            }
        }
        "LancamentoOrdemProducaoSP.lancarOrdensDeProducao" => {
            if let Some(delay) = slow_launch {
                tokio::time::sleep(delay).await;
            }
            if launch_nothing {
                json!({
                    "status": "1",
                    "responseBody": {"ordensIniciadas": {"quantidade": {"$": "0"}}}
                })
            } else if launch_as_array {
                json!({
                    "status": "1",
                    "responseBody": {
                        "ordensIniciadas": {"quantidade": {"$": "2"}},
                        "ordens": {"ordem": [{"$": "900222"}, {"$": "900223"}]}
                    }
                })
            } else {
                json!({
                    "status": "1",
                    "responseBody": {
                        "ordensIniciadas": {"quantidade": {"$": "1"}},
                        "ordens": {"ordem": {"$": "900111"}}
                    }
                })
            }
        }
        "MobileLoginSP.logout" => {
            if fail_logout {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            json!({"status": "1"})
        }
        _ => json!({"status": "0", "statusMessage": "unknown service"}),
    };
    Json(reply).into_response()
}

fn request() -> OrderRequest {
    OrderRequest {
        product_code: "P1".to_string(),
        process_id: 51,
        plp_id: 1,
        lot_size: dec!(100),
    }
}

#[tokio::test]
async fn test_login_sends_credential_headers() {
    let mock = MockSankhya::start().await;
    let client = mock.client();

    client.authenticate().await.unwrap();
    assert!(client.is_authenticated());

    let logins = mock.state.logins.lock().clone();
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0]["token"], "client-token");
    assert_eq!(logins[0]["appkey"], "app-key");
    assert_eq!(logins[0]["username"], "svc");
    assert_eq!(logins[0]["password"], "secret");
}

#[tokio::test]
async fn test_login_refusal_surfaces_status_message() {
    let mock = MockSankhya::start().await;
    mock.state.script.lock().refuse_login = true;
    let client = mock.client();

    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, GatewayError::Rejected { step: OrderStep::Login, .. }));
    assert_eq!(err.to_string(), "Usuário ou senha inválidos");
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_login_requires_token_and_session() {
    let mock = MockSankhya::start().await;
    let config = SankhyaConfig {
        mge_session: String::new(),
        ..mock.config()
    };
    let client = SankhyaClient::new(config).unwrap();

    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, GatewayError::MissingCredentials(_)));
    assert!(mock.state.logins.lock().is_empty());
}

#[tokio::test]
async fn test_create_order_runs_four_calls_in_order() {
    let mock = MockSankhya::start().await;
    let client = mock.client();
    client.authenticate().await.unwrap();

    let order_id = client.create_order(&request()).await.unwrap();
    assert_eq!(order_id, OrderId(900111));
    assert_eq!(
        mock.services(),
        vec![
            "LancamentoOrdemProducaoSP.getNovoLancamentoOP",
            "LancamentoOrdemProducaoSP.inserirProdutoHTML5",
            "LancamentoOrdemProducaoSP.validarTamanhoLote",
            "LancamentoOrdemProducaoSP.lancarOrdensDeProducao",
        ]
    );

    let received = mock.received();
    let insert = &received[1];
    assert_eq!(insert.authorization.as_deref(), Some("Bearer bearer-abc"));
    assert_eq!(insert.query["outputType"], "json");
    assert_eq!(insert.query["mgeSession"], "mge-1");
    assert_eq!(insert.query["resourceID"], "br.com.sankhya.prod.OrdensProducaoHTML");
    assert_eq!(insert.body["serviceName"], "LancamentoOrdemProducaoSP.inserirProdutoHTML5");
    let params = &insert.body["requestBody"]["params"];
    assert_eq!(params["nulop"], "3301");
    assert_eq!(params["codprod"], "P1");
    assert_eq!(params["idproc"], "51");
    assert_eq!(params["tamlote"], "100");

    let launch = &received[3].body["requestBody"]["params"];
    assert_eq!(launch["nulop"], "3301");
    assert_eq!(launch["ignorarWarnings"], "N");
}

#[tokio::test]
async fn test_launch_with_several_orders_takes_first() {
    let mock = MockSankhya::start().await;
    mock.state.script.lock().launch_as_array = true;
    let client = mock.client();
    client.authenticate().await.unwrap();

    assert_eq!(client.create_order(&request()).await.unwrap(), OrderId(900222));
}

#[tokio::test]
async fn test_rejected_insert_stops_sequence() {
    let mock = MockSankhya::start().await;
    mock.state.script.lock().reject_insert = Some("Produto inativo".to_string());
    let client = mock.client();
    client.authenticate().await.unwrap();

    let err = client.create_order(&request()).await.unwrap_err();
    assert_eq!(err.to_string(), "Produto inativo");
    assert_eq!(mock.services().len(), 2);
}

#[tokio::test]
async fn test_lot_validation_rejection_is_soft() {
    let mock = MockSankhya::start().await;
    mock.state.script.lock().reject_validation = true;
    let client = mock.client();
    client.authenticate().await.unwrap();

    assert_eq!(client.create_order(&request()).await.unwrap(), OrderId(900111));
}

#[tokio::test]
async fn test_launch_without_started_orders_fails() {
    let mock = MockSankhya::start().await;
    mock.state.script.lock().launch_nothing = true;
    let client = mock.client();
    client.authenticate().await.unwrap();

    let err = client.create_order(&request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Rejected { step: OrderStep::Launch, .. }));
}

#[tokio::test]
async fn test_slow_launch_times_out_with_generic_message() {
    let mock = MockSankhya::start().await;
    mock.state.script.lock().slow_launch = Some(Duration::from_millis(800));
    let config = SankhyaConfig {
        request_timeout_ms: 200,
        ..mock.config()
    };
    let client = SankhyaClient::new(config).unwrap();
    client.authenticate().await.unwrap();

    let err = client.create_order(&request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout { step: OrderStep::Launch, .. }));
}

#[tokio::test]
async fn test_create_order_without_session() {
    let mock = MockSankhya::start().await;
    let client = mock.client();

    let err = client.create_order(&request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotAuthenticated));
    assert!(mock.services().is_empty());
}

#[tokio::test]
async fn test_logout_clears_token_even_on_failure() {
    let mock = MockSankhya::start().await;
    mock.state.script.lock().fail_logout = true;
    let client = mock.client();
    client.authenticate().await.unwrap();

    client.logout().await;
    assert!(!client.is_authenticated());
    assert_eq!(mock.services(), vec!["MobileLoginSP.logout"]);

    // Second logout has no token and sends nothing.
    client.logout().await;
    assert_eq!(mock.services().len(), 1);
}

#[tokio::test]
async fn test_connection_probe() {
    let mock = MockSankhya::start().await;
    let client = mock.client();

    client.test_connection().await.unwrap();
    assert!(!client.is_authenticated());
    assert_eq!(mock.services(), vec!["MobileLoginSP.logout"]);
}
