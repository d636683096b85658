// file: src/error.rs
// description: Custom error types, error kind classification and result type aliases
// reference: https://docs.rs/thiserror

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<PipelineError>,
    },

    #[error("Aggregation output is not valid JSON: {0}")]
    AggregationParse(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Not found: no descriptions stored for keyword '{keyword}'")]
    NoData { keyword: String },

    #[error("Generation request failed: {0}")]
    Generation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Task table error: {0}")]
    TaskTable(#[from] sqlx::Error),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task {0} not found")]
    TaskNotFound(i64),

    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Task timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification carried on `error` progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderUnavailable,
    DescribeExhausted,
    AggregationParseError,
    MissingParameter,
    NoData,
    Internal,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            PipelineError::Exhausted { .. } => ErrorKind::DescribeExhausted,
            PipelineError::AggregationParse(_) => ErrorKind::AggregationParseError,
            PipelineError::MissingParameter(_) => ErrorKind::MissingParameter,
            PipelineError::NoData { .. } => ErrorKind::NoData,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let exhausted = PipelineError::Exhausted {
            attempts: 3,
            last: Box::new(PipelineError::Generation("503".to_string())),
        };
        assert_eq!(exhausted.kind(), ErrorKind::DescribeExhausted);
        assert!(exhausted.to_string().contains("503"));

        let no_data = PipelineError::NoData {
            keyword: "demo".to_string(),
        };
        assert_eq!(no_data.kind(), ErrorKind::NoData);
        assert!(no_data.to_string().starts_with("Not found"));

        assert_eq!(
            PipelineError::Database("down".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::AggregationParseError).unwrap();
        assert_eq!(json, "\"aggregation_parse_error\"");
    }
}
