//! Sankhya gateway client.
//!
//! Holds one bearer token at a time. The token is zeroed when replaced or
//! cleared and never leaves this module.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use opauto_core::OrderId;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::config::SankhyaConfig;
use crate::error::{GatewayError, GatewayResult, OrderStep};
use crate::gateway::{BoxFuture, DynOrderGateway, GatewayConnector, OrderGateway, OrderRequest};
use crate::protocol::{self, LoginResponse, ServiceResponse};

/// HTTP client for the Sankhya service gateway.
pub struct SankhyaClient {
    client: Client,
    config: SankhyaConfig,
    token: Mutex<Option<Zeroizing<String>>>,
}

impl SankhyaClient {
    pub fn new(config: SankhyaConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        info!(
            login_url = %config.login_url,
            gateway_url = %config.gateway_url,
            "Sankhya client created"
        );

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    fn current_token(&self) -> GatewayResult<Zeroizing<String>> {
        self.token.lock().clone().ok_or(GatewayError::NotAuthenticated)
    }

    fn map_send_error(&self, step: OrderStep, err: reqwest::Error, timeout: Duration) -> GatewayError {
        if err.is_timeout() {
            error!(%step, "ERP request timed out");
            GatewayError::Timeout {
                step,
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            error!(%step, error = %err, "ERP request failed");
            GatewayError::Transport {
                step,
                detail: err.to_string(),
            }
        }
    }

    /// POST one service call and decode the envelope.
    async fn call_service(
        &self,
        step: OrderStep,
        params: Value,
        timeout: Duration,
    ) -> GatewayResult<ServiceResponse> {
        let token = self.current_token()?;
        let service = step.service_name();
        let started = Instant::now();

        let response = self
            .client
            .post(&self.config.gateway_url)
            .query(&[
                ("serviceName", service),
                ("outputType", "json"),
                ("mgeSession", self.config.mge_session.as_str()),
                ("resourceID", self.config.resource_id.as_str()),
            ])
            .bearer_auth(token.as_str())
            .timeout(timeout)
            .json(&protocol::envelope(step, params))
            .send()
            .await
            .map_err(|e| self.map_send_error(step, e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%step, %status, body = %body, "ERP returned HTTP error");
            return Err(GatewayError::Transport {
                step,
                detail: format!("HTTP {status}"),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.map_send_error(step, e, timeout))?;
        let decoded: ServiceResponse = serde_json::from_str(&text).map_err(|e| {
            error!(%step, body = %text, "ERP response is not valid JSON");
            GatewayError::Malformed {
                step,
                detail: format!("invalid JSON: {e}"),
            }
        })?;

        debug!(
            %step,
            ok = decoded.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ERP service call finished"
        );
        if !decoded.is_ok() {
            warn!(%step, response = %text, "ERP service call not accepted");
        }
        Ok(decoded)
    }

    async fn open_draft(&self) -> GatewayResult<i64> {
        let response = self
            .call_service(
                OrderStep::OpenDraft,
                protocol::open_draft_params(Local::now()),
                self.config.request_timeout(),
            )
            .await?;
        let draft_id = protocol::parse_draft_id(&response)?;
        debug!(draft_id, "Draft opened");
        Ok(draft_id)
    }

    async fn insert_product(&self, draft_id: i64, request: &OrderRequest) -> GatewayResult<()> {
        let response = self
            .call_service(
                OrderStep::InsertProduct,
                protocol::insert_product_params(draft_id, request),
                self.config.request_timeout(),
            )
            .await?;
        protocol::ensure_ok(&response, OrderStep::InsertProduct)?;
        debug!(draft_id, product = %request.product_code, "Product inserted");
        Ok(())
    }

    /// Lot validation never stops the sequence.
    async fn validate_lot(&self, request: &OrderRequest) {
        let result = self
            .call_service(
                OrderStep::ValidateLot,
                protocol::validate_lot_params(request),
                self.config.request_timeout(),
            )
            .await
            .and_then(|response| protocol::ensure_ok(&response, OrderStep::ValidateLot));

        match result {
            Ok(()) => debug!(lot_size = %request.lot_size, "Lot size validated"),
            Err(e) => warn!(
                lot_size = %request.lot_size,
                error = %e,
                "Lot validation did not pass, continuing"
            ),
        }
    }

    async fn launch(&self, draft_id: i64) -> GatewayResult<OrderId> {
        let response = self
            .call_service(
                OrderStep::Launch,
                protocol::launch_params(draft_id),
                self.config.request_timeout(),
            )
            .await?;
        protocol::parse_launched_order(&response)
    }

    async fn login(&self) -> GatewayResult<()> {
        let missing = self.config.missing_credentials();
        if !missing.is_empty() {
            error!(missing = ?missing, "Sankhya credentials not configured");
            return Err(GatewayError::MissingCredentials(missing.join(", ")));
        }

        info!("Authenticating with Sankhya");
        let timeout = self.config.request_timeout();
        let response = self
            .client
            .post(&self.config.login_url)
            .header("token", &self.config.client_token)
            .header("appkey", &self.config.app_key)
            .header("username", &self.config.username)
            .header("password", &self.config.password)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(OrderStep::Login, e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "Sankhya login returned HTTP error");
            return Err(GatewayError::Transport {
                step: OrderStep::Login,
                detail: format!("HTTP {status}"),
            });
        }

        let login: LoginResponse = response.json().await.map_err(|e| GatewayError::Malformed {
            step: OrderStep::Login,
            detail: format!("invalid login response: {e}"),
        })?;

        let token = match login.into_token() {
            Ok(token) => token,
            Err(e) => {
                error!(reason = %e, "Sankhya login refused");
                return Err(e);
            }
        };
        *self.token.lock() = Some(Zeroizing::new(token));
        info!("Sankhya session opened");
        Ok(())
    }

    async fn end_session(&self) {
        let Some(token) = self.token.lock().take() else {
            info!("No active Sankhya session to log out");
            return;
        };

        let timeout = self.config.logout_timeout();
        let result = self
            .client
            .post(&self.config.gateway_url)
            .query(&[
                ("serviceName", OrderStep::Logout.service_name()),
                ("outputType", "json"),
                ("mgeSession", self.config.mge_session.as_str()),
            ])
            .bearer_auth(token.as_str())
            .timeout(timeout)
            .json(&json!({}))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<ServiceResponse>().await {
                    Ok(body) if body.is_ok() => info!("Sankhya session closed"),
                    Ok(body) => warn!(
                        message = %body.message_or("no status message"),
                        "Sankhya logout not acknowledged"
                    ),
                    Err(e) => warn!(error = %e, "Sankhya logout response unreadable"),
                }
            }
            Ok(response) => warn!(status = %response.status(), "Sankhya logout returned HTTP error"),
            Err(e) => warn!(error = %e, "Sankhya logout request failed"),
        }
        // Token already taken out of the slot; dropping it zeroes the buffer.
    }
}

impl OrderGateway for SankhyaClient {
    fn authenticate(&self) -> BoxFuture<'_, GatewayResult<()>> {
        Box::pin(async move {
            // A stale token must not survive a failed login.
            self.token.lock().take();
            self.login().await
        })
    }

    fn create_order<'a>(
        &'a self,
        request: &'a OrderRequest,
    ) -> BoxFuture<'a, GatewayResult<OrderId>> {
        Box::pin(async move {
            let started = Instant::now();
            let draft_id = self.open_draft().await?;
            self.insert_product(draft_id, request).await?;
            self.validate_lot(request).await;
            let order_id = self.launch(draft_id).await?;

            info!(
                %order_id,
                draft_id,
                product = %request.product_code,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Production order launched"
            );
            Ok(order_id)
        })
    }

    fn logout(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.end_session())
    }

    fn is_authenticated(&self) -> bool {
        self.token.lock().is_some()
    }
}

/// Opens a fresh Sankhya client per unit of work.
#[derive(Debug, Clone)]
pub struct SankhyaConnector {
    config: SankhyaConfig,
}

impl SankhyaConnector {
    pub fn new(config: SankhyaConfig) -> Self {
        Self { config }
    }
}

impl GatewayConnector for SankhyaConnector {
    fn open(&self) -> GatewayResult<DynOrderGateway> {
        Ok(Arc::new(SankhyaClient::new(self.config.clone())?))
    }
}
