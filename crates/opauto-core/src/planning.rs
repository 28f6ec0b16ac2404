//! Planning records and run scoping.
//!
//! A planning record is one row of demand (product + quantity) scheduled for a
//! production line ("braço") on a given day and round. A run covers one day, one
//! line and an inclusive range of rounds.

use crate::error::{CoreError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Planning record identifier (NUPLAN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub i64);

impl PlanId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Production order identifier assigned by the ERP (IDIPROC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl OrderId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Batch ("lote") identifier assigned by the ERP batch procedure (NROLOTE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub i64);

impl BatchId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pending unit of work.
///
/// A record is pending while `order_id` is `None`. It becomes batched once its
/// order has been consolidated and `batch_id` is written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningRecord {
    pub plan_id: PlanId,
    pub product_code: String,
    pub planned_qty: Decimal,
    pub round: i32,
    pub order_id: Option<OrderId>,
    pub batch_id: Option<BatchId>,
}

impl PlanningRecord {
    /// Create a pending record (no order, no batch).
    pub fn pending(
        plan_id: PlanId,
        product_code: impl Into<String>,
        planned_qty: Decimal,
        round: i32,
    ) -> Self {
        Self {
            plan_id,
            product_code: product_code.into(),
            planned_qty,
            round,
            order_id: None,
            batch_id: None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.order_id.is_none()
    }

    #[must_use]
    pub fn is_batched(&self) -> bool {
        self.order_id.is_some() && self.batch_id.is_some()
    }
}

/// Parameters scoping one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    /// Planning date, compared against the date part of the record's inclusion time.
    #[serde(deserialize_with = "deserialize_plan_date")]
    pub plan_date: NaiveDate,
    /// Production line ("braço").
    pub line: i32,
    /// First round, inclusive.
    pub round_from: i32,
    /// Last round, inclusive.
    pub round_to: i32,
}

impl RunParams {
    /// Build and validate run parameters.
    pub fn new(plan_date: NaiveDate, line: i32, round_from: i32, round_to: i32) -> Result<Self> {
        let params = Self {
            plan_date,
            line,
            round_from,
            round_to,
        };
        params.validate()?;
        Ok(params)
    }

    /// Line and rounds must be positive and the range must not be inverted.
    pub fn validate(&self) -> Result<()> {
        if self.line <= 0 {
            return Err(CoreError::InvalidParams(format!(
                "line must be positive, got {}",
                self.line
            )));
        }
        if self.round_from <= 0 || self.round_to <= 0 {
            return Err(CoreError::InvalidParams(format!(
                "rounds must be positive, got {}..={}",
                self.round_from, self.round_to
            )));
        }
        if self.round_from > self.round_to {
            return Err(CoreError::InvalidParams(format!(
                "round_from ({}) is after round_to ({})",
                self.round_from, self.round_to
            )));
        }
        Ok(())
    }

    /// Rounds to process, ascending.
    pub fn rounds(&self) -> RangeInclusive<i32> {
        self.round_from..=self.round_to
    }
}

/// Parse a planning date.
///
/// Accepts ISO (`2025-07-21`) as sent by the web front-end and the Brazilian
/// `21/07/2025` form operators type at the console.
pub fn parse_plan_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
        .map_err(|_| {
            CoreError::InvalidDate(format!(
                "'{trimmed}' is neither YYYY-MM-DD nor DD/MM/YYYY"
            ))
        })
}

fn deserialize_plan_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_plan_date(&raw).map_err(serde::de::Error::custom)
}
