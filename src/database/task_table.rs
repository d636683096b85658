// file: src/database/task_table.rs
// description: task metadata table interface and the in-memory implementation

use crate::error::Result;
use crate::models::{NewTask, Task, TaskId, TaskStatus};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Relational row store for tasks. Every write touches a single row.
#[async_trait]
pub trait TaskTable: Send + Sync {
    async fn insert(&self, new_task: NewTask) -> Result<Task>;

    /// Conditional single-row update: applies only while the row is still in
    /// `expected`. Returns whether a row changed.
    async fn update(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        summary: Option<String>,
        error: Option<String>,
    ) -> Result<bool>;

    async fn select(&self, requester: &str) -> Result<Vec<Task>>;

    async fn get(&self, task_id: TaskId) -> Result<Option<Task>>;

    async fn delete(&self, task_id: TaskId) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

/// Process-local table used when no Postgres URL is configured
#[derive(Default)]
pub struct InMemoryTaskTable {
    rows: DashMap<TaskId, Task>,
    next_id: AtomicI64,
}

impl InMemoryTaskTable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskTable for InMemoryTaskTable {
    async fn insert(&self, new_task: NewTask) -> Result<Task> {
        let task_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let task = Task::from_new(task_id, new_task, Utc::now());
        self.rows.insert(task_id, task.clone());
        Ok(task)
    }

    async fn update(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        summary: Option<String>,
        error: Option<String>,
    ) -> Result<bool> {
        let Some(mut row) = self.rows.get_mut(&task_id) else {
            return Ok(false);
        };

        if row.status != expected {
            return Ok(false);
        }

        row.status = next;
        row.summary = summary;
        row.error = error;
        Ok(true)
    }

    async fn select(&self, requester: &str) -> Result<Vec<Task>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.requester == requester)
            .map(|row| row.value().clone())
            .collect())
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<Task>> {
        Ok(self.rows.get(&task_id).map(|row| row.value().clone()))
    }

    async fn delete(&self, task_id: TaskId) -> Result<bool> {
        Ok(self.rows.remove(&task_id).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
