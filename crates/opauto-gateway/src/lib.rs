//! Sankhya ERP gateway.
//!
//! Creates production orders through the ERP's HTTP service gateway. One
//! order is a fixed four-call sequence (open draft, insert product, validate
//! lot, launch) inside a session opened by `authenticate` and closed by
//! `logout`.
//!
//! - `SankhyaClient`: the real gateway over `reqwest`
//! - `SimulatedGateway`: sequential order ids for simulation mode and tests

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod simulated;

pub use client::{SankhyaClient, SankhyaConnector};
pub use config::SankhyaConfig;
pub use error::{GatewayError, GatewayResult, OrderStep};
pub use gateway::{BoxFuture, DynOrderGateway, GatewayConnector, OrderGateway, OrderRequest};
pub use simulated::{GatewayCall, SimulatedConnector, SimulatedGateway};
