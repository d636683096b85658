// file: src/models/event.rs
// description: live progress events broadcast per task

use crate::error::{ErrorKind, PipelineError};
use crate::models::summary::SummaryReport;
use crate::models::task::TaskId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Progress,
    Summary,
    Error,
    Connection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    Progress { message: String },
    Summary { data: SummaryReport },
    Error { error: String, kind: ErrorKind },
    Connection { message: String },
}

/// Ephemeral notification; serialized flat as
/// `{"task_id": 1, "type": "progress", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ProgressEvent {
    pub fn progress(task_id: TaskId, message: impl Into<String>) -> Self {
        Self {
            task_id,
            payload: EventPayload::Progress {
                message: message.into(),
            },
        }
    }

    pub fn summary(task_id: TaskId, report: SummaryReport) -> Self {
        Self {
            task_id,
            payload: EventPayload::Summary { data: report },
        }
    }

    pub fn error(task_id: TaskId, err: &PipelineError) -> Self {
        Self {
            task_id,
            payload: EventPayload::Error {
                error: err.to_string(),
                kind: err.kind(),
            },
        }
    }

    pub fn connection(task_id: TaskId) -> Self {
        Self {
            task_id,
            payload: EventPayload::Connection {
                message: format!("Subscribed to task {}", task_id),
            },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Progress { .. } => EventKind::Progress,
            EventPayload::Summary { .. } => EventKind::Summary,
            EventPayload::Error { .. } => EventKind::Error,
            EventPayload::Connection { .. } => EventKind::Connection,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind(), EventKind::Summary | EventKind::Error)
    }
}
