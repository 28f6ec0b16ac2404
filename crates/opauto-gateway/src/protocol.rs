//! Sankhya service-gateway wire format.
//!
//! Requests are `{serviceName, requestBody: {params}}`. Responses carry a
//! `status` ("1" on success), an optional `statusMessage` and a free-form
//! `responseBody`. Numeric fields arrive either as JSON numbers or as
//! strings, and XML-derived values hide behind a `"$"` key.

use chrono::{DateTime, Local};
use opauto_core::OrderId;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{GatewayError, GatewayResult, OrderStep};
use crate::gateway::OrderRequest;

/// Description prefix of drafts opened by this service.
pub const DRAFT_DESCRIPTION: &str = "Novo lançamento via API";

/// Raw service response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceResponse {
    #[serde(default)]
    pub status: Value,
    #[serde(rename = "statusMessage", default)]
    pub status_message: Option<String>,
    #[serde(rename = "responseBody", default)]
    pub response_body: Value,
}

impl ServiceResponse {
    pub fn is_ok(&self) -> bool {
        match &self.status {
            Value::String(s) => s == "1",
            Value::Number(n) => n.as_i64() == Some(1),
            _ => false,
        }
    }

    /// Status message, or `fallback` when the ERP sent none.
    pub fn message_or(&self, fallback: &str) -> String {
        self.status_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    fn rejection(&self, step: OrderStep, fallback: &str) -> GatewayError {
        GatewayError::Rejected {
            step,
            message: self.message_or(fallback),
        }
    }
}

/// Login response.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "bearerToken", default)]
    pub bearer_token: Option<String>,
    #[serde(rename = "statusMessage", default)]
    pub status_message: Option<String>,
}

impl LoginResponse {
    /// Extract the bearer token or the ERP's reason for not issuing one.
    pub fn into_token(self) -> GatewayResult<String> {
        match self.bearer_token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(token),
            None => Err(GatewayError::Rejected {
                step: OrderStep::Login,
                message: self
                    .status_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "bearerToken missing from login response".to_string()),
            }),
        }
    }
}

/// Wrap params into the request envelope.
pub fn envelope(step: OrderStep, params: Value) -> Value {
    json!({
        "serviceName": step.service_name(),
        "requestBody": { "params": params },
    })
}

/// Lot sizes are sent as plain decimal strings (`"100"`, `"12.5"`).
pub fn format_lot_size(lot_size: Decimal) -> String {
    lot_size.normalize().to_string()
}

pub fn open_draft_params(now: DateTime<Local>) -> Value {
    json!({
        "descricao": format!("{DRAFT_DESCRIPTION} - {}", now.format("%d/%m/%Y %H:%M:%S")),
        "reutilizar": "N",
    })
}

pub fn insert_product_params(draft_id: i64, request: &OrderRequest) -> Value {
    json!({
        "nulop": draft_id.to_string(),
        "codprod": request.product_code,
        "idproc": request.process_id.to_string(),
        "codplp": request.plp_id.to_string(),
        "tamlote": format_lot_size(request.lot_size),
        "agruparEmUnicaOP": false,
        "controle": {},
        "minLote": "0.0",
        "multiIdeal": "0.0",
        "oldTamLote": "1.0",
        "opDesmonte": "N",
        "opReparo": "N",
    })
}

pub fn validate_lot_params(request: &OrderRequest) -> Value {
    json!({
        "tamLote": format_lot_size(request.lot_size),
        "multiploIdeal": "0",
        "minLote": "0",
    })
}

pub fn launch_params(draft_id: i64) -> Value {
    json!({
        "nulop": draft_id.to_string(),
        "ignorarWarnings": "N",
    })
}

/// Integer from a number, a numeric string, or a `{"$": ...}` wrapper.
pub fn json_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("$").and_then(json_int),
        _ => None,
    }
}

/// Draft id (NULOP) from a successful draft response.
pub fn parse_draft_id(response: &ServiceResponse) -> GatewayResult<i64> {
    if !response.is_ok() {
        return Err(response.rejection(OrderStep::OpenDraft, "draft creation rejected"));
    }
    response
        .response_body
        .pointer("/lancamento/nulop")
        .and_then(json_int)
        .ok_or_else(|| GatewayError::Malformed {
            step: OrderStep::OpenDraft,
            detail: "responseBody.lancamento.nulop missing".to_string(),
        })
}

/// Success check for steps whose body carries nothing we need.
pub fn ensure_ok(response: &ServiceResponse, step: OrderStep) -> GatewayResult<()> {
    if response.is_ok() {
        Ok(())
    } else {
        Err(response.rejection(step, &format!("{step} rejected")))
    }
}

/// Order id from a launch response.
///
/// The launch only counts when `ordensIniciadas.quantidade` is positive.
/// `ordens.ordem` is an object for one order and an array for several; the
/// first one is ours.
pub fn parse_launched_order(response: &ServiceResponse) -> GatewayResult<OrderId> {
    let started = response
        .response_body
        .pointer("/ordensIniciadas/quantidade")
        .and_then(json_int)
        .unwrap_or(0);

    if !response.is_ok() || started <= 0 {
        return Err(response.rejection(OrderStep::Launch, "no production order was started"));
    }

    let orders = response.response_body.pointer("/ordens/ordem");
    let first = match orders {
        Some(Value::Array(items)) => items.first(),
        Some(item @ Value::Object(_)) => Some(item),
        _ => None,
    };

    first
        .and_then(json_int)
        .map(OrderId::new)
        .ok_or_else(|| GatewayError::Malformed {
            step: OrderStep::Launch,
            detail: "responseBody.ordens.ordem has no order id".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn response(value: Value) -> ServiceResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_status_accepts_string_and_number() {
        assert!(response(json!({"status": "1"})).is_ok());
        assert!(response(json!({"status": 1})).is_ok());
        assert!(!response(json!({"status": "0"})).is_ok());
        assert!(!response(json!({})).is_ok());
    }

    #[test]
    fn test_json_int_shapes() {
        assert_eq!(json_int(&json!(42)), Some(42));
        assert_eq!(json_int(&json!("42")), Some(42));
        assert_eq!(json_int(&json!({"$": "42"})), Some(42));
        assert_eq!(json_int(&json!("abc")), None);
    }

    #[test]
    fn test_parse_draft_id() {
        let ok = response(json!({"status": "1", "responseBody": {"lancamento": {"nulop": "3301"}}}));
        assert_eq!(parse_draft_id(&ok).unwrap(), 3301);

        let rejected = response(json!({"status": "0", "statusMessage": "Sessão expirada"}));
        let err = parse_draft_id(&rejected).unwrap_err();
        assert_eq!(err.to_string(), "Sessão expirada");
    }

    #[test]
    fn test_parse_launched_order_single_object() {
        let ok = response(json!({
            "status": "1",
            "responseBody": {
                "ordensIniciadas": {"quantidade": {"$": "1"}},
                "ordens": {"ordem": {"$": "900111"}}
            }
        }));
        assert_eq!(parse_launched_order(&ok).unwrap(), OrderId(900111));
    }

    #[test]
    fn test_parse_launched_order_array_takes_first() {
        let ok = response(json!({
            "status": "1",
            "responseBody": {
                "ordensIniciadas": {"quantidade": {"$": "2"}},
                "ordens": {"ordem": [{"$": "900111"}, {"$": "900112"}]}
            }
        }));
        assert_eq!(parse_launched_order(&ok).unwrap(), OrderId(900111));
    }

    #[test]
    fn test_parse_launched_order_requires_started_orders() {
        let none_started = response(json!({
            "status": "1",
            "statusMessage": "Produto sem roteiro",
            "responseBody": {
                "ordensIniciadas": {"quantidade": {"$": "0"}},
                "ordens": {"ordem": {"$": "900111"}}
            }
        }));
        let err = parse_launched_order(&none_started).unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { step: OrderStep::Launch, .. }));
        assert_eq!(err.to_string(), "Produto sem roteiro");
    }

    #[test]
    fn test_login_token_or_reason() {
        let ok: LoginResponse = serde_json::from_value(json!({"bearerToken": "abc"})).unwrap();
        assert_eq!(ok.into_token().unwrap(), "abc");

        let denied: LoginResponse =
            serde_json::from_value(json!({"statusMessage": "Usuário inválido"})).unwrap();
        assert_eq!(denied.into_token().unwrap_err().to_string(), "Usuário inválido");
    }

    #[test]
    fn test_insert_product_params() {
        let request = OrderRequest {
            product_code: "P1".to_string(),
            process_id: 51,
            plp_id: 1,
            lot_size: dec!(100.00),
        };
        let params = insert_product_params(3301, &request);
        assert_eq!(params["nulop"], "3301");
        assert_eq!(params["codprod"], "P1");
        assert_eq!(params["idproc"], "51");
        assert_eq!(params["codplp"], "1");
        assert_eq!(params["tamlote"], "100");
        assert_eq!(params["agruparEmUnicaOP"], false);
    }

    #[test]
    fn test_envelope_names_service() {
        let body = envelope(OrderStep::Launch, launch_params(7));
        assert_eq!(body["serviceName"], "LancamentoOrdemProducaoSP.lancarOrdensDeProducao");
        assert_eq!(body["requestBody"]["params"]["ignorarWarnings"], "N");
    }
}
