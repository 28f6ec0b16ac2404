//! Run summary.
//!
//! Created with zero counters at run start, mutated as each record is processed,
//! read-only once the run is over. Never persisted.

use crate::planning::{OrderId, PlanId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The gateway rejected or could not complete the order sequence.
    Gateway,
    /// The order exists in the ERP but the planning row was not updated.
    /// Needs manual reconciliation; retrying would duplicate the remote order.
    Divergence,
    /// Processing the record panicked.
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Divergence => "divergence",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record whose order was created and written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSuccess {
    pub plan_id: PlanId,
    pub order_id: OrderId,
}

/// A record that could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFailure {
    pub plan_id: PlanId,
    pub kind: FailureKind,
    pub message: String,
}

/// Aggregate outcome of one orchestration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub created_count: u64,
    pub failed_count: u64,
    /// In processing order.
    pub successes: Vec<OrderSuccess>,
    /// In processing order.
    pub failures: Vec<OrderFailure>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, plan_id: PlanId, order_id: OrderId) {
        self.created_count += 1;
        self.successes.push(OrderSuccess { plan_id, order_id });
    }

    pub fn record_failure(&mut self, plan_id: PlanId, kind: FailureKind, message: impl Into<String>) {
        self.failed_count += 1;
        self.failures.push(OrderFailure {
            plan_id,
            kind,
            message: message.into(),
        });
    }

    /// Records processed so far (created + failed).
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.created_count + self.failed_count
    }
}
