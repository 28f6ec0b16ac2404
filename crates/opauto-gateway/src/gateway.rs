//! Order gateway trait.
//!
//! Abstracts the ERP so the orchestrator can run against the Sankhya client,
//! the simulated gateway, or test doubles.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use opauto_core::OrderId;
use rust_decimal::Decimal;

use crate::error::GatewayResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything the ERP needs to create one production order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub product_code: String,
    /// Production process (IDPROC).
    pub process_id: i64,
    /// Production plan (CODPLP).
    pub plp_id: i64,
    /// Lot size; the planned quantity of the record.
    pub lot_size: Decimal,
}

/// Session-scoped access to the ERP order services.
///
/// A session lives for one round: `authenticate` at round start, any number
/// of `create_order`, then `logout`.
pub trait OrderGateway: Send + Sync {
    /// Open a session. Any previous token is replaced.
    fn authenticate(&self) -> BoxFuture<'_, GatewayResult<()>>;

    /// Run the order-creation sequence once, without retries.
    fn create_order<'a>(&'a self, request: &'a OrderRequest)
        -> BoxFuture<'a, GatewayResult<OrderId>>;

    /// Close the session. Best effort: failures are logged, the local token
    /// is always cleared, and without a token this is a no-op.
    fn logout(&self) -> BoxFuture<'_, ()>;

    /// Whether a session token is currently held.
    fn is_authenticated(&self) -> bool;

    /// Authenticate then log out.
    fn test_connection(&self) -> BoxFuture<'_, GatewayResult<()>> {
        Box::pin(async move {
            self.authenticate().await?;
            self.logout().await;
            Ok(())
        })
    }
}

/// Arc wrapper for OrderGateway trait objects.
pub type DynOrderGateway = Arc<dyn OrderGateway>;

/// Opens a gateway for one unit of work (a run or a probe).
///
/// Each opened gateway carries its own session, so a probe never logs out
/// the session of a run in progress.
pub trait GatewayConnector: Send + Sync {
    fn open(&self) -> GatewayResult<DynOrderGateway>;
}

/// A shared gateway handed out as is.
impl<G: OrderGateway + 'static> GatewayConnector for Arc<G> {
    fn open(&self) -> GatewayResult<DynOrderGateway> {
        Ok(self.clone())
    }
}
