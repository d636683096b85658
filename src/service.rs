// file: src/service.rs
// description: caller-facing task operations over the store, orchestrator and progress bus
// reference: boundary surface shared by the http server and the cli

use crate::aggregate::Evaluator;
use crate::broadcast::{ProgressBus, Subscription};
use crate::config::PipelineConfig;
use crate::database::TaskStateStore;
use crate::error::Result;
use crate::models::{EvaluationReport, NewTask, Task, TaskId};
use crate::pipeline::{PipelineDeps, PipelineOrchestrator, TaskOutcome};
use crate::utils::validation::Validator;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Clone)]
pub struct TaskService {
    store: TaskStateStore,
    bus: Arc<ProgressBus>,
    orchestrator: Arc<PipelineOrchestrator>,
    evaluator: Arc<Evaluator>,
    max_requested_count: usize,
}

impl TaskService {
    pub fn new(deps: PipelineDeps, config: &PipelineConfig, evaluator: Arc<Evaluator>) -> Self {
        Self {
            store: deps.store.clone(),
            bus: deps.bus.clone(),
            orchestrator: Arc::new(PipelineOrchestrator::new(deps, config)),
            evaluator,
            max_requested_count: config.max_requested_count,
        }
    }

    pub fn store(&self) -> &TaskStateStore {
        &self.store
    }

    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    /// Validates and records a task without starting it
    pub async fn create(&self, mut new_task: NewTask) -> Result<Task> {
        new_task.keyword = new_task.keyword.trim().to_string();
        Validator::validate_keyword(&new_task.keyword)?;
        Validator::validate_requested_count(new_task.requested_count, self.max_requested_count)?;

        self.store.create(new_task).await
    }

    /// Runs `task` on its own tokio task. The outcome is observable through
    /// the store and the progress bus only.
    pub fn spawn(&self, task: Task) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let task_id = task.task_id;
            match orchestrator.run(&task).await {
                Ok(outcome) => info!(
                    "Task {} finished with {} sources",
                    task_id,
                    outcome.report.sources.len()
                ),
                // already recorded on the task and broadcast
                Err(e) => debug!("Task {} ended with error: {}", task_id, e),
            }
        })
    }

    /// Fire-and-forget creation; returns as soon as the task is stored
    pub async fn create_task(&self, new_task: NewTask) -> Result<Task> {
        let task = self.create(new_task).await?;
        self.spawn(task.clone());
        Ok(task)
    }

    /// Creates a task and waits for it, surfacing a failure to the caller
    pub async fn run_task(&self, new_task: NewTask) -> Result<(Task, TaskOutcome)> {
        let task = self.create(new_task).await?;
        let outcome = self.run(&task).await?;
        Ok((task, outcome))
    }

    /// Runs an already created task on the calling tokio task
    pub async fn run(&self, task: &Task) -> Result<TaskOutcome> {
        self.orchestrator.run(task).await
    }

    pub async fn get_tasks(&self, requester: &str) -> Result<Vec<Task>> {
        self.store.list(requester).await
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<Task> {
        self.store.get(task_id).await
    }

    pub async fn delete_task(&self, task_id: TaskId) -> Result<()> {
        self.store.delete(task_id).await
    }

    /// Live events for an existing task; nothing published earlier is replayed
    pub async fn subscribe(&self, task_id: TaskId) -> Result<Subscription> {
        self.store.get(task_id).await?;
        Ok(self.bus.subscribe(task_id))
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.bus.unsubscribe(subscription.task_id, subscription.id);
    }

    pub async fn evaluate(&self, summary: &str, sources: &[String]) -> Result<EvaluationReport> {
        self.evaluator.evaluate(summary, sources).await
    }
}
