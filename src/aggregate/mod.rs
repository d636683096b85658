// file: src/aggregate/mod.rs
// description: aggregation of per-item descriptions into one summary, and summary evaluation

pub mod aggregator;
pub mod batching;
pub mod evaluation;
pub mod narrowing;
pub mod prompt;

pub use aggregator::{AggregationOutput, Aggregator};
pub use batching::BatchPlan;
pub use evaluation::Evaluator;
pub use narrowing::Narrower;
