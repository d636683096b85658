// file: src/database/postgres.rs
// description: Postgres-backed task table
// reference: https://docs.rs/sqlx

use crate::database::task_table::TaskTable;
use crate::error::{PipelineError, Result};
use crate::models::{NewTask, Task, TaskId, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    task_id BIGSERIAL PRIMARY KEY,
    requester TEXT NOT NULL,
    keyword TEXT NOT NULL,
    requested_count BIGINT,
    skip_download BOOLEAN NOT NULL DEFAULT FALSE,
    status TEXT NOT NULL,
    summary TEXT,
    error TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const TASK_COLUMNS: &str =
    "task_id, requester, keyword, requested_count, skip_download, status, summary, error, created_at";

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: i64,
    requester: String,
    keyword: String,
    requested_count: Option<i64>,
    skip_download: bool,
    status: String,
    summary: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = PipelineError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            task_id: row.task_id,
            requester: row.requester,
            keyword: row.keyword,
            requested_count: row.requested_count.map(|n| n.max(0) as usize),
            skip_download: row.skip_download,
            status: row.status.parse()?,
            summary: row.summary,
            error: row.error,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgTaskTable {
    pool: PgPool,
}

impl PgTaskTable {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting task table to Postgres");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;

        let table = Self { pool };
        table.migrate().await?;
        Ok(table)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskTable for PgTaskTable {
    async fn insert(&self, new_task: NewTask) -> Result<Task> {
        let sql = format!(
            "INSERT INTO tasks (requester, keyword, requested_count, skip_download, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            TASK_COLUMNS
        );

        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(&new_task.requester)
            .bind(&new_task.keyword)
            .bind(new_task.requested_count.map(|n| n as i64))
            .bind(new_task.skip_download)
            .bind(TaskStatus::Created.as_str())
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn update(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        summary: Option<String>,
        error: Option<String>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = $1, summary = $2, error = $3 \
             WHERE task_id = $4 AND status = $5",
        )
        .bind(next.as_str())
        .bind(summary)
        .bind(error)
        .bind(task_id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn select(&self, requester: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE requester = $1 ORDER BY created_at DESC, task_id DESC",
            TASK_COLUMNS
        );

        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(requester)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE task_id = $1", TASK_COLUMNS);

        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn delete(&self, task_id: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
