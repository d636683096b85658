// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: pipeline orchestration

mod describer;
mod orchestrator;
mod progress;
mod retry;

pub use describer::ItemDescriber;
pub use orchestrator::{PipelineDeps, PipelineOrchestrator, TaskOutcome};
pub use progress::{PipelineStats, ProgressTracker};
pub use retry::RetryingInvoker;
