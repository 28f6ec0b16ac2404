//! Round orchestration for production-order automation.
//!
//! - `RoundOrchestrator`: one run over a day, a line and a range of rounds
//! - `ProgressSink`: where a run reports what it is doing
//! - `RunController`: at most one run per process, summary shared with readers

pub mod controller;
pub mod error;
pub mod orchestrator;
pub mod sink;

pub use controller::{RunController, RunSnapshot, RunStatus, StartedRun};
pub use error::{EngineError, EngineResult};
pub use orchestrator::{OrchestratorSettings, RoundOrchestrator, SharedSummary};
pub use sink::{DynProgressSink, FanoutSink, ProgressSink, RecordingSink};
