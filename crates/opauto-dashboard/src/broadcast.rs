//! Fan-out of run progress to WebSocket clients.
//!
//! Each event is serialized once and pushed into a `broadcast` channel; every
//! connected client holds its own receiver. A client that falls behind skips
//! ahead instead of slowing the run down.

use opauto_core::{ProgressEvent, Severity};
use opauto_engine::ProgressSink;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// `ProgressSink` that publishes JSON-encoded [`ProgressEvent`]s.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<String>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }

    /// Create a sink together with a fresh channel of the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn sender(&self) -> broadcast::Sender<String> {
        self.tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    fn publish(&self, event: &ProgressEvent) {
        match serde_json::to_string(event) {
            Ok(json) => {
                // No receivers just means nobody is watching.
                match self.tx.send(json) {
                    Ok(receivers) => trace!(receivers, "Progress event broadcast"),
                    Err(_) => trace!("No WebSocket clients, progress event dropped"),
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize progress event"),
        }
    }
}

impl ProgressSink for BroadcastSink {
    fn log(&self, message: &str, severity: Severity) {
        self.publish(&ProgressEvent::LogUpdate {
            message: message.to_string(),
            severity,
        });
    }

    fn counters(&self, created: u64, failed: u64, current_round: i32) {
        self.publish(&ProgressEvent::CountersUpdate {
            created,
            failed,
            current_round,
        });
    }

    fn progress(&self, current: u64, total: u64) {
        self.publish(&ProgressEvent::ProgressBarUpdate { current, total });
    }

    fn finished(&self) {
        self.publish(&ProgressEvent::ProcessFinished);
    }
}
