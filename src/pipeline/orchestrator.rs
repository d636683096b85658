// file: src/pipeline/orchestrator.rs
// description: drives one task through fetch, describe, persist and aggregate stages
// reference: orchestrates the asynchronous summarization workflow

use crate::aggregate::Aggregator;
use crate::broadcast::ProgressBus;
use crate::clients::{MediaStore, SearchProvider};
use crate::config::PipelineConfig;
use crate::database::{DescriptionLog, TaskStateStore};
use crate::error::{PipelineError, Result};
use crate::models::{Item, ProgressEvent, SearchPage, SummaryReport, Task, TaskId, TaskStatus};
use crate::pipeline::describer::ItemDescriber;
use crate::pipeline::progress::PipelineStats;
use crate::utils::telemetry::OperationTimer;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Collaborators shared by every task in the process
#[derive(Clone)]
pub struct PipelineDeps {
    pub search: Arc<dyn SearchProvider>,
    pub media: Arc<dyn MediaStore>,
    pub describer: Arc<ItemDescriber>,
    pub log: Arc<dyn DescriptionLog>,
    pub aggregator: Arc<Aggregator>,
    pub store: TaskStateStore,
    pub bus: Arc<ProgressBus>,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub report: SummaryReport,
    pub stats: PipelineStats,
}

pub struct PipelineOrchestrator {
    deps: PipelineDeps,
    describe_prompt: String,
    max_query_attempts: usize,
    task_timeout: Option<Duration>,
}

impl PipelineOrchestrator {
    pub fn new(deps: PipelineDeps, config: &PipelineConfig) -> Self {
        Self {
            deps,
            describe_prompt: config.describe_prompt.clone(),
            max_query_attempts: config.max_query_attempts.max(1),
            task_timeout: config.task_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Runs `task` to a terminal state. The store is updated before the
    /// terminal event is published; a failure is also returned to the caller.
    pub async fn run(&self, task: &Task) -> Result<TaskOutcome> {
        let task_id = task.task_id;

        if !task.skip_download && task.requested_count.is_none() {
            let err = PipelineError::MissingParameter(
                "requested_count is required when skip_download is false".to_string(),
            );
            return Err(self.fail(task_id, err).await);
        }

        if let Err(e) = self
            .deps
            .store
            .update_status(task_id, TaskStatus::InProgress, None)
            .await
        {
            return Err(self.fail(task_id, e).await);
        }

        self.progress(task_id, format!("Task started for keyword '{}'", task.keyword))
            .await;

        let start = Instant::now();
        let mut stats = PipelineStats::new();
        let executed = match self.task_timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute(task, &mut stats))
                .await
                .unwrap_or(Err(PipelineError::Timeout(limit.as_secs()))),
            None => self.execute(task, &mut stats).await,
        };
        stats.duration_secs = start.elapsed().as_secs();

        let report = match executed {
            Ok(report) => report,
            Err(e) => return Err(self.fail(task_id, e).await),
        };

        if let Err(e) = self
            .deps
            .store
            .update_status(task_id, TaskStatus::Done, Some(report.summary.clone()))
            .await
        {
            return Err(self.fail(task_id, e).await);
        }

        self.deps
            .bus
            .publish(ProgressEvent::summary(task_id, report.clone()))
            .await;

        log_final_stats(task_id, &stats);
        Ok(TaskOutcome { report, stats })
    }

    async fn execute(&self, task: &Task, stats: &mut PipelineStats) -> Result<SummaryReport> {
        let task_id = task.task_id;

        match task.requested_count {
            Some(requested) if !task.skip_download => {
                if let Err(e) = self.fetch_and_describe(task, requested, stats).await {
                    warn!("Task {} download stage failed: {}", task_id, e);
                    stats.download_failed = true;
                    self.progress(task_id, format!("Error during download: {}", e))
                        .await;
                    self.progress(task_id, "Download failed, retrieving past descriptions...")
                        .await;
                }
            }
            _ => {
                self.progress(task_id, "Skipping download, retrieving past descriptions...")
                    .await;
            }
        }

        self.progress(task_id, "Generating the final summary...").await;
        let timer = OperationTimer::new("aggregate");

        let descriptions = self.deps.log.read_all(&task.keyword).await?;
        if descriptions.is_empty() {
            return Err(PipelineError::NoData {
                keyword: task.keyword.clone(),
            });
        }

        let output = self
            .deps
            .aggregator
            .aggregate(&task.keyword, descriptions)
            .await?;
        stats.descriptions_aggregated = output.sources.len();
        stats.batch_count = output.batch_count;

        let parsed = Aggregator::parse(&output.text)?;
        timer.finish_with_count(output.sources.len());

        Ok(SummaryReport::new(
            &task.keyword,
            parsed,
            &output.prompt,
            output.sources,
        ))
    }

    async fn fetch_and_describe(
        &self,
        task: &Task,
        requested: usize,
        stats: &mut PipelineStats,
    ) -> Result<()> {
        let task_id = task.task_id;
        let keyword = task.keyword.as_str();
        let timer = OperationTimer::new("fetch");

        self.progress(task_id, format!("Fetching up to {} videos...", requested))
            .await;
        let pages = self.query_pages(keyword, requested).await?;
        stats.queries_made = pages.len();
        self.progress(task_id, format!("Total search queries made: {}", pages.len()))
            .await;

        self.deps.log.ensure_table(keyword).await?;

        let mut processed = 0;
        for (idx, page) in pages.iter().enumerate() {
            if processed >= requested {
                break;
            }

            self.progress(task_id, format!("Downloading batch {}...", idx + 1))
                .await;

            for item_ref in page.items.iter().filter(|item| item.is_downloadable()) {
                if processed >= requested {
                    break;
                }

                let local_path = self.deps.media.download(keyword, item_ref).await?;
                stats.items_downloaded += 1;

                self.progress(
                    task_id,
                    format!("Analyzing video {}/{}...", processed + 1, requested),
                )
                .await;

                let item = Item::downloaded(item_ref.item_id.clone(), local_path);
                let description = self
                    .deps
                    .describer
                    .describe(&item, &self.describe_prompt)
                    .await?;

                if let Some(record) = item.with_description(description).into_record(keyword) {
                    self.deps.log.append(&record).await?;
                }

                processed += 1;
                stats.items_described += 1;
            }
        }

        timer.finish_with_count(processed);
        Ok(())
    }

    /// Pages until enough downloadable items are known, the provider runs out
    /// of pages, or the query ceiling is hit.
    async fn query_pages(&self, keyword: &str, requested: usize) -> Result<Vec<SearchPage>> {
        let mut pages = Vec::new();
        let mut found = 0;
        let mut cursor: Option<String> = None;

        while pages.len() < self.max_query_attempts && found < requested {
            let page = self.deps.search.search(keyword, cursor.as_deref()).await?;
            found += page.downloadable_count();
            cursor = page.next_cursor.clone();
            pages.push(page);

            if cursor.is_none() {
                break;
            }
        }

        info!(
            "Query loop for '{}' found {} downloadable items in {} pages",
            keyword,
            found,
            pages.len()
        );
        Ok(pages)
    }

    async fn progress(&self, task_id: TaskId, message: impl Into<String>) {
        self.deps
            .bus
            .publish(ProgressEvent::progress(task_id, message))
            .await;
    }

    async fn fail(&self, task_id: TaskId, err: PipelineError) -> PipelineError {
        error!("Task {} failed: {}", task_id, err);

        if let Err(e) = self
            .deps
            .store
            .update_status(task_id, TaskStatus::Failed, Some(err.to_string()))
            .await
        {
            warn!("Could not record failure of task {}: {}", task_id, e);
        }

        self.deps
            .bus
            .publish(ProgressEvent::error(task_id, &err))
            .await;
        err
    }
}

fn log_final_stats(task_id: TaskId, stats: &PipelineStats) {
    info!("=== Task {} Summary ===", task_id);
    info!("Duration: {} seconds", stats.duration_secs);
    info!("Search queries: {}", stats.queries_made);
    info!("Videos downloaded: {}", stats.items_downloaded);
    info!("Videos described: {}", stats.items_described);
    info!("Download failed: {}", stats.download_failed);
    info!("Descriptions aggregated: {}", stats.descriptions_aggregated);
    info!("Aggregation batches: {}", stats.batch_count);
    info!("Describe success rate: {:.1}%", stats.success_rate());
    info!("Throughput: {:.2} videos/sec", stats.items_per_second());
    info!("=========================");
}
