// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod aggregate;
pub mod app;
pub mod broadcast;
pub mod clients;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod utils;

#[cfg(test)]
mod testing;

pub use aggregate::{AggregationOutput, Aggregator, Evaluator, Narrower};
pub use app::AppContext;
pub use broadcast::{Broker, BrokerStatus, NullBroker, ProgressBus, RedisBroker};
pub use config::{AggregationConfig, Config, PipelineConfig, RetryConfig};
pub use error::{ErrorKind, PipelineError, Result};
pub use models::{
    DescriptionRecord, EvaluationReport, Item, NewTask, ProgressEvent, SummaryReport, Task,
    TaskId, TaskStatus,
};
pub use pipeline::{PipelineOrchestrator, PipelineStats, ProgressTracker, RetryingInvoker};
pub use service::TaskService;
pub use utils::{HealthCheck, HealthReport, HealthStatus, OperationTimer, Validator};
