// file: src/database/description_log.rs
// description: keyword-scoped append-only description log interface and in-memory log

use crate::error::Result;
use crate::models::DescriptionRecord;
use async_trait::async_trait;
use dashmap::DashMap;

/// Shared across tasks: every task with the same keyword reads and grows the
/// same log. Insert-only, read by full scan.
#[async_trait]
pub trait DescriptionLog: Send + Sync {
    async fn ensure_table(&self, keyword: &str) -> Result<()>;

    async fn append(&self, record: &DescriptionRecord) -> Result<()>;

    /// Summaries in storage order; an unknown keyword yields an empty list.
    async fn read_all(&self, keyword: &str) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryDescriptionLog {
    tables: DashMap<String, Vec<DescriptionRecord>>,
}

impl InMemoryDescriptionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DescriptionLog for InMemoryDescriptionLog {
    async fn ensure_table(&self, keyword: &str) -> Result<()> {
        self.tables.entry(keyword.to_string()).or_default();
        Ok(())
    }

    async fn append(&self, record: &DescriptionRecord) -> Result<()> {
        self.tables
            .entry(record.task_keyword.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn read_all(&self, keyword: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .get(keyword)
            .map(|rows| rows.iter().map(|r| r.summary.clone()).collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
