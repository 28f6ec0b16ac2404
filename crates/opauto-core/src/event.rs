//! Progress events.
//!
//! These are the four things a run reports while it works. The wire names match
//! what the operator page listens for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A progress event as pushed to live listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    LogUpdate {
        message: String,
        #[serde(rename = "type")]
        severity: Severity,
    },
    CountersUpdate {
        created: u64,
        failed: u64,
        current_round: i32,
    },
    ProgressBarUpdate {
        current: u64,
        total: u64,
    },
    ProcessFinished,
}
