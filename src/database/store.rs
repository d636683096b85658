// file: src/database/store.rs
// description: task lifecycle store enforcing forward-only transitions over a task table

use crate::database::task_table::TaskTable;
use crate::error::{PipelineError, Result};
use crate::models::{NewTask, Task, TaskId, TaskStatus};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns task state for the whole process. State updates and progress
/// publishing are separate steps; callers publish after a successful update.
#[derive(Clone)]
pub struct TaskStateStore {
    table: Arc<dyn TaskTable>,
}

impl TaskStateStore {
    pub fn new(table: Arc<dyn TaskTable>) -> Self {
        Self { table }
    }

    pub async fn create(&self, new_task: NewTask) -> Result<Task> {
        let task = self.table.insert(new_task).await?;
        info!("Created task {} for keyword '{}'", task.task_id, task.keyword);
        Ok(task)
    }

    /// `detail` becomes the summary on `Done` and the error text on `Failed`.
    pub async fn update_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        detail: Option<String>,
    ) -> Result<()> {
        let current = self.get(task_id).await?;
        if !current.status.can_transition_to(status) {
            return Err(PipelineError::InvalidTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        let (summary, error) = match status {
            TaskStatus::Done => (Some(detail.unwrap_or_default()), None),
            TaskStatus::Failed => (None, Some(detail.unwrap_or_default())),
            _ => (None, None),
        };

        let updated = self
            .table
            .update(task_id, current.status, status, summary, error)
            .await?;

        if !updated {
            // the row moved (or vanished) between the read and the write
            let now = self.get(task_id).await?;
            return Err(PipelineError::InvalidTransition {
                from: now.status.to_string(),
                to: status.to_string(),
            });
        }

        debug!("Task {} moved {} -> {}", task_id, current.status, status);
        Ok(())
    }

    /// Newest first
    pub async fn list(&self, requester: &str) -> Result<Vec<Task>> {
        let mut tasks = self.table.select(requester).await?;
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.task_id.cmp(&a.task_id))
        });
        Ok(tasks)
    }

    pub async fn get(&self, task_id: TaskId) -> Result<Task> {
        self.table
            .get(task_id)
            .await?
            .ok_or(PipelineError::TaskNotFound(task_id))
    }

    pub async fn delete(&self, task_id: TaskId) -> Result<()> {
        if self.table.delete(task_id).await? {
            info!("Deleted task {}", task_id);
            Ok(())
        } else {
            Err(PipelineError::TaskNotFound(task_id))
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.table.ping().await
    }
}
