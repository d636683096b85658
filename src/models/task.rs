// file: src/models/task.rs
// description: task record and its forward-only lifecycle
// reference: internal data structures

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TaskId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    /// Created may fail before it starts (rejected parameters); terminal
    /// states never move again.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Created, TaskStatus::InProgress)
                | (TaskStatus::Created, TaskStatus::Failed)
                | (TaskStatus::InProgress, TaskStatus::Done)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(TaskStatus::Created),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(PipelineError::Validation(format!(
                "Unknown task status: {}",
                other
            ))),
        }
    }
}

/// Parameters supplied by the caller when a task is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub requester: String,
    pub keyword: String,
    pub requested_count: Option<usize>,
    pub skip_download: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub requester: String,
    pub keyword: String,
    pub requested_count: Option<usize>,
    pub skip_download: bool,
    pub status: TaskStatus,
    /// Set only when `status` is `Done`.
    pub summary: Option<String>,
    /// Set only when `status` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn from_new(task_id: TaskId, new_task: NewTask, created_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            requester: new_task.requester,
            keyword: new_task.keyword,
            requested_count: new_task.requested_count,
            skip_download: new_task.skip_download,
            status: TaskStatus::Created,
            summary: None,
            error: None,
            created_at,
        }
    }
}
