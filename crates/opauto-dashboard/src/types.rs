//! Request and response bodies of the operator API.

use opauto_core::{parse_plan_date, CoreError, RunParams};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `/api/automation/pending` and `/api/automation/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// `YYYY-MM-DD` or `DD/MM/YYYY`.
    pub plan_date: String,
    pub line: i32,
    pub round_from: i32,
    pub round_to: i32,
}

impl RunRequest {
    pub fn into_params(self) -> Result<RunParams, CoreError> {
        let plan_date = parse_plan_date(&self.plan_date)?;
        RunParams::new(plan_date, self.line, self.round_from, self.round_to)
    }
}

/// Uniform JSON reply of the operator API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn total(total: u64) -> Self {
        Self {
            success: true,
            total: Some(total),
            ..Self::default()
        }
    }

    pub fn started(run_id: Uuid) -> Self {
        Self {
            success: true,
            message: Some("Automation started in the background".to_string()),
            run_id: Some(run_id),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request(date: &str, from: i32, to: i32) -> RunRequest {
        RunRequest {
            plan_date: date.to_string(),
            line: 1,
            round_from: from,
            round_to: to,
        }
    }

    #[test]
    fn test_into_params_accepts_both_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 7, 21).unwrap();
        assert_eq!(request("2025-07-21", 1, 3).into_params().unwrap().plan_date, expected);
        assert_eq!(request("21/07/2025", 1, 3).into_params().unwrap().plan_date, expected);
    }

    #[test]
    fn test_into_params_rejects_bad_input() {
        assert!(request("yesterday", 1, 3).into_params().is_err());
        assert!(request("2025-07-21", 3, 1).into_params().is_err());
    }

    #[test]
    fn test_response_omits_absent_fields() {
        let json = serde_json::to_string(&ApiResponse::total(4)).unwrap();
        assert_eq!(json, r#"{"success":true,"total":4}"#);

        let json = serde_json::to_string(&ApiResponse::failed("down")).unwrap();
        assert_eq!(json, r#"{"success":false,"error":"down"}"#);
    }
}
