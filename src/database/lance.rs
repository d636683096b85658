// file: src/database/lance.rs
// description: LanceDB-backed description log, one table per keyword
// reference: https://docs.rs/lancedb

use crate::database::description_log::DescriptionLog;
use crate::error::{PipelineError, Result};
use crate::models::DescriptionRecord;
use crate::utils::validation::Validator;
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{Connection, Table, connect};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct LanceDbDescriptionLog {
    connection: Connection,
}

impl LanceDbDescriptionLog {
    pub async fn new(uri: &str) -> Result<Self> {
        info!("Connecting description log to LanceDB at {}", uri);

        let connection = connect(uri)
            .execute()
            .await
            .map_err(|e| PipelineError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self { connection })
    }

    pub fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("filename", DataType::Utf8, false),
            Field::new("summary", DataType::Utf8, false),
            Field::new("appended_at", DataType::UInt64, false),
        ]))
    }

    async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| PipelineError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.iter().any(|name| name == table_name))
    }

    async fn open_table(&self, table_name: &str) -> Result<Table> {
        self.connection
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| {
                PipelineError::Database(format!("Failed to open table {}: {}", table_name, e))
            })
    }

    fn record_batch(record: &DescriptionRecord) -> Result<RecordBatch> {
        let filenames = StringArray::from(vec![record.filename.as_str()]);
        let summaries = StringArray::from(vec![record.summary.as_str()]);
        let appended_at = UInt64Array::from(vec![Utc::now().timestamp_millis().max(0) as u64]);

        RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(filenames),
                Arc::new(summaries),
                Arc::new(appended_at),
            ],
        )
        .map_err(|e| PipelineError::Database(format!("Failed to create record batch: {}", e)))
    }
}

#[async_trait]
impl DescriptionLog for LanceDbDescriptionLog {
    async fn ensure_table(&self, keyword: &str) -> Result<()> {
        let table_name = Validator::keyword_table_name(keyword);
        if self.table_exists(&table_name).await? {
            return Ok(());
        }

        let created = self
            .connection
            .create_empty_table(&table_name, Self::schema())
            .execute()
            .await;

        match created {
            Ok(_) => {
                info!("Created description table {} for '{}'", table_name, keyword);
                Ok(())
            }
            // another task for the same keyword may have won the race
            Err(e) if self.table_exists(&table_name).await? => {
                debug!("Table {} appeared concurrently: {}", table_name, e);
                Ok(())
            }
            Err(e) => Err(PipelineError::Database(format!(
                "Failed to create table {}: {}",
                table_name, e
            ))),
        }
    }

    async fn append(&self, record: &DescriptionRecord) -> Result<()> {
        let table_name = Validator::keyword_table_name(&record.task_keyword);
        self.ensure_table(&record.task_keyword).await?;

        let batch = Self::record_batch(record)?;
        let table = self.open_table(&table_name).await?;
        table
            .add(RecordBatchIterator::new(vec![Ok(batch)], Self::schema()))
            .execute()
            .await
            .map_err(|e| PipelineError::Database(format!("Failed to append description: {}", e)))?;

        debug!("Appended description for {} to {}", record.filename, table_name);
        Ok(())
    }

    async fn read_all(&self, keyword: &str) -> Result<Vec<String>> {
        let table_name = Validator::keyword_table_name(keyword);
        if !self.table_exists(&table_name).await? {
            return Ok(Vec::new());
        }

        let table = self.open_table(&table_name).await?;
        let mut stream = table
            .query()
            .execute()
            .await
            .map_err(|e| PipelineError::Database(format!("Failed to scan {}: {}", table_name, e)))?;

        let mut summaries = Vec::new();
        while let Some(batch_result) = stream.next().await {
            let batch = batch_result.map_err(|e| {
                PipelineError::Database(format!("Failed to read result batch: {}", e))
            })?;

            let column = batch
                .column_by_name("summary")
                .ok_or_else(|| PipelineError::Database("Missing 'summary' column".to_string()))?
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| {
                    PipelineError::Database("Invalid 'summary' column type".to_string())
                })?;

            summaries.extend((0..batch.num_rows()).map(|i| column.value(i).to_string()));
        }

        debug!("Read {} descriptions for '{}'", summaries.len(), keyword);
        Ok(summaries)
    }

    async fn ping(&self) -> Result<()> {
        self.connection
            .table_names()
            .execute()
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::Database(format!("LanceDB connection failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_schema_fields() {
        let schema = LanceDbDescriptionLog::schema();
        assert_eq!(schema.fields().len(), 3);
        assert!(schema.field_with_name("summary").is_ok());
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("lance");
        let log = LanceDbDescriptionLog::new(uri.to_str().unwrap()).await.unwrap();

        assert!(log.read_all("demo").await.unwrap().is_empty());

        log.ensure_table("demo").await.unwrap();
        log.ensure_table("demo").await.unwrap();
        for (filename, summary) in [("a.mp4", "a cat"), ("b.mp4", "a dog")] {
            log.append(&DescriptionRecord {
                task_keyword: "demo".to_string(),
                filename: filename.to_string(),
                summary: summary.to_string(),
            })
            .await
            .unwrap();
        }

        let mut summaries = log.read_all("demo").await.unwrap();
        summaries.sort();
        assert_eq!(summaries, vec!["a cat", "a dog"]);
    }
}
