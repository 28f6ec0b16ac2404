//! Simulated gateway.
//!
//! Issues sequential order ids without any network. Failures can be
//! scripted per product code or per login attempt, and every call is
//! recorded for assertions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opauto_core::OrderId;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult, OrderStep};
use crate::gateway::{BoxFuture, DynOrderGateway, GatewayConnector, OrderGateway, OrderRequest};

/// First order id issued by default.
pub const DEFAULT_FIRST_ORDER_ID: i64 = 900_111;

/// A call as seen by the simulated gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Authenticate,
    CreateOrder {
        product_code: String,
        lot_size: Decimal,
    },
    Logout,
}

#[derive(Debug)]
enum ScriptedFailure {
    Rejected(String),
    Transport,
}

#[derive(Debug)]
struct State {
    authenticated: bool,
    login_attempts: u32,
    fail_login_attempts: HashSet<u32>,
    product_failures: HashMap<String, ScriptedFailure>,
    calls: Vec<GatewayCall>,
}

/// In-process stand-in for the ERP gateway.
#[derive(Debug)]
pub struct SimulatedGateway {
    state: Mutex<State>,
    next_order_id: Arc<AtomicI64>,
    latency: Duration,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::starting_at(DEFAULT_FIRST_ORDER_ID)
    }

    pub fn starting_at(first_order_id: i64) -> Self {
        Self::with_sequence(Arc::new(AtomicI64::new(first_order_id)))
    }

    /// Share the order id sequence with other simulated gateways.
    pub fn with_sequence(next_order_id: Arc<AtomicI64>) -> Self {
        Self {
            state: Mutex::new(State {
                authenticated: false,
                login_attempts: 0,
                fail_login_attempts: HashSet::new(),
                product_failures: HashMap::new(),
                calls: Vec::new(),
            }),
            next_order_id,
            latency: Duration::ZERO,
        }
    }

    /// Delay applied to every order creation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject orders for `product_code` with the given ERP message.
    pub fn reject_product(&self, product_code: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .product_failures
            .insert(product_code.into(), ScriptedFailure::Rejected(message.into()));
    }

    /// Fail orders for `product_code` as a transport error.
    pub fn drop_product(&self, product_code: impl Into<String>) {
        self.state
            .lock()
            .product_failures
            .insert(product_code.into(), ScriptedFailure::Transport);
    }

    /// Refuse the `attempt`-th login (1-based).
    pub fn fail_login_attempt(&self, attempt: u32) {
        self.state.lock().fail_login_attempts.insert(attempt);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    pub fn login_attempts(&self) -> u32 {
        self.state.lock().login_attempts
    }
}

impl OrderGateway for SimulatedGateway {
    fn authenticate(&self) -> BoxFuture<'_, GatewayResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall::Authenticate);
            state.login_attempts += 1;
            state.authenticated = false;

            let attempt = state.login_attempts;
            if state.fail_login_attempts.contains(&attempt) {
                return Err(GatewayError::Rejected {
                    step: OrderStep::Login,
                    message: format!("simulated login refusal (attempt {attempt})"),
                });
            }
            state.authenticated = true;
            debug!(attempt, "Simulated session opened");
            Ok(())
        })
    }

    fn create_order<'a>(
        &'a self,
        request: &'a OrderRequest,
    ) -> BoxFuture<'a, GatewayResult<OrderId>> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            let mut state = self.state.lock();
            state.calls.push(GatewayCall::CreateOrder {
                product_code: request.product_code.clone(),
                lot_size: request.lot_size,
            });
            if !state.authenticated {
                return Err(GatewayError::NotAuthenticated);
            }

            match state.product_failures.get(&request.product_code) {
                Some(ScriptedFailure::Rejected(message)) => {
                    return Err(GatewayError::Rejected {
                        step: OrderStep::InsertProduct,
                        message: message.clone(),
                    });
                }
                Some(ScriptedFailure::Transport) => {
                    return Err(GatewayError::Transport {
                        step: OrderStep::Launch,
                        detail: "simulated transport failure".to_string(),
                    });
                }
                None => {}
            }

            let order_id = OrderId::new(self.next_order_id.fetch_add(1, Ordering::SeqCst));
            info!(%order_id, product = %request.product_code, "Simulated order launched");
            Ok(order_id)
        })
    }

    fn logout(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if !state.authenticated {
                debug!("No simulated session to log out");
                return;
            }
            state.calls.push(GatewayCall::Logout);
            state.authenticated = false;
        })
    }

    fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }
}

/// Opens simulated gateways that share one order id sequence.
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    next_order_id: Arc<AtomicI64>,
    latency: Duration,
}

impl SimulatedConnector {
    pub fn new(first_order_id: i64, latency: Duration) -> Self {
        Self {
            next_order_id: Arc::new(AtomicI64::new(first_order_id)),
            latency,
        }
    }
}

impl GatewayConnector for SimulatedConnector {
    fn open(&self) -> GatewayResult<DynOrderGateway> {
        let gateway = SimulatedGateway::with_sequence(self.next_order_id.clone())
            .with_latency(self.latency);
        Ok(Arc::new(gateway))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(product: &str) -> OrderRequest {
        OrderRequest {
            product_code: product.to_string(),
            process_id: 51,
            plp_id: 1,
            lot_size: dec!(100),
        }
    }

    #[tokio::test]
    async fn test_sequential_ids_within_session() {
        let gateway = SimulatedGateway::new();
        gateway.authenticate().await.unwrap();
        assert_eq!(gateway.create_order(&request("P1")).await.unwrap(), OrderId(900111));
        assert_eq!(gateway.create_order(&request("P2")).await.unwrap(), OrderId(900112));
    }

    #[tokio::test]
    async fn test_requires_session() {
        let gateway = SimulatedGateway::new();
        let err = gateway.create_order(&request("P1")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let gateway = SimulatedGateway::new();
        gateway.reject_product("P2", "Produto inativo");
        gateway.drop_product("P3");
        gateway.authenticate().await.unwrap();

        let rejected = gateway.create_order(&request("P2")).await.unwrap_err();
        assert_eq!(rejected.to_string(), "Produto inativo");
        let dropped = gateway.create_order(&request("P3")).await.unwrap_err();
        assert!(matches!(dropped, GatewayError::Transport { .. }));
        // Failures do not consume ids.
        assert_eq!(gateway.create_order(&request("P1")).await.unwrap(), OrderId(900111));
    }

    #[tokio::test]
    async fn test_login_failure_on_nth_attempt() {
        let gateway = SimulatedGateway::new();
        gateway.fail_login_attempt(2);
        assert!(gateway.authenticate().await.is_ok());
        gateway.logout().await;
        assert!(gateway.authenticate().await.is_err());
        assert!(!gateway.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_without_session_is_noop() {
        let gateway = SimulatedGateway::new();
        gateway.logout().await;
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connector_sessions_are_independent() {
        let connector = SimulatedConnector::new(100, Duration::ZERO);
        let first = connector.open().unwrap();
        let second = connector.open().unwrap();

        first.authenticate().await.unwrap();
        second.test_connection().await.unwrap();
        assert!(first.is_authenticated());

        assert_eq!(first.create_order(&request("P1")).await.unwrap(), OrderId(100));
        second.authenticate().await.unwrap();
        assert_eq!(second.create_order(&request("P1")).await.unwrap(), OrderId(101));
    }

    #[tokio::test]
    async fn test_connection_probe_logs_out() {
        let gateway = SimulatedGateway::new();
        gateway.test_connection().await.unwrap();
        assert_eq!(gateway.calls(), vec![GatewayCall::Authenticate, GatewayCall::Logout]);
        assert!(!gateway.is_authenticated());
    }
}
