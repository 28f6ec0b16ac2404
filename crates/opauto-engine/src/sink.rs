//! Progress sinks.
//!
//! A run reports through a `ProgressSink` and never waits on it. Sinks that
//! forward to slow consumers must buffer or drop, not block.

use std::sync::Arc;

use opauto_core::{ProgressEvent, Severity};
use parking_lot::Mutex;

/// Receiver of run progress.
pub trait ProgressSink: Send + Sync {
    fn log(&self, message: &str, severity: Severity);

    fn counters(&self, created: u64, failed: u64, current_round: i32);

    fn progress(&self, current: u64, total: u64);

    /// Emitted exactly once per run, after cleanup.
    fn finished(&self);
}

/// Arc wrapper for ProgressSink trait objects.
pub type DynProgressSink = Arc<dyn ProgressSink>;

/// Forwards every event to each inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<DynProgressSink>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<DynProgressSink>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: DynProgressSink) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ProgressSink for FanoutSink {
    fn log(&self, message: &str, severity: Severity) {
        for sink in &self.sinks {
            sink.log(message, severity);
        }
    }

    fn counters(&self, created: u64, failed: u64, current_round: i32) {
        for sink in &self.sinks {
            sink.counters(created, failed, current_round);
        }
    }

    fn progress(&self, current: u64, total: u64) {
        for sink in &self.sinks {
            sink.progress(current, total);
        }
    }

    fn finished(&self) {
        for sink in &self.sinks {
            sink.finished();
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// Log messages of the given severity, in order.
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::LogUpdate {
                    message,
                    severity: s,
                } if *s == severity => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(current, total)` pairs, in order.
    pub fn progress_updates(&self) -> Vec<(u64, u64)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::ProgressBarUpdate { current, total } => Some((*current, *total)),
                _ => None,
            })
            .collect()
    }

    /// Last `(created, failed, current_round)` reported.
    pub fn last_counters(&self) -> Option<(u64, u64, i32)> {
        self.events.lock().iter().rev().find_map(|event| match event {
            ProgressEvent::CountersUpdate {
                created,
                failed,
                current_round,
            } => Some((*created, *failed, *current_round)),
            _ => None,
        })
    }

    pub fn finished_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, ProgressEvent::ProcessFinished))
            .count()
    }

    fn push(&self, event: ProgressEvent) {
        self.events.lock().push(event);
    }
}

impl ProgressSink for RecordingSink {
    fn log(&self, message: &str, severity: Severity) {
        self.push(ProgressEvent::LogUpdate {
            message: message.to_string(),
            severity,
        });
    }

    fn counters(&self, created: u64, failed: u64, current_round: i32) {
        self.push(ProgressEvent::CountersUpdate {
            created,
            failed,
            current_round,
        });
    }

    fn progress(&self, current: u64, total: u64) {
        self.push(ProgressEvent::ProgressBarUpdate { current, total });
    }

    fn finished(&self) {
        self.push(ProgressEvent::ProcessFinished);
    }
}
