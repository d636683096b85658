// file: src/server/handlers.rs
// description: json request handlers and error responses for the task api

use crate::app::AppContext;
use crate::broadcast::BrokerStatus;
use crate::error::PipelineError;
use crate::models::{EvaluationReport, NewTask, SummaryReport, Task, TaskId};
use crate::utils::telemetry::{HealthReport, HealthStatus};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::Validation(_) | PipelineError::MissingParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::TaskNotFound(_) | PipelineError::NoData { .. } => StatusCode::NOT_FOUND,
            PipelineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            PipelineError::ProviderUnavailable(_)
            | PipelineError::Exhausted { .. }
            | PipelineError::Generation(_)
            | PipelineError::AggregationParse(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub email: String,
    pub keyword: String,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub skip_download: bool,
}

impl From<TaskRequest> for NewTask {
    fn from(req: TaskRequest) -> Self {
        NewTask {
            requester: req.email,
            keyword: req.keyword,
            requested_count: req.count,
            skip_download: req.skip_download,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task: Task,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub task: Task,
    pub result: SummaryReport,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub summary: String,
    pub sources: Vec<String>,
}

pub async fn create_task(
    State(app): State<AppContext>,
    Json(req): Json<TaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskResponse>)> {
    let task = app.service.create_task(req.into()).await?;
    Ok((StatusCode::CREATED, Json(TaskResponse { task })))
}

/// Blocks until the task finishes so the caller sees the outcome directly
pub async fn trigger_task(
    State(app): State<AppContext>,
    Json(req): Json<TaskRequest>,
) -> ApiResult<Json<TriggerResponse>> {
    let (task, outcome) = app.service.run_task(req.into()).await?;
    let task = app.service.get_task(task.task_id).await.unwrap_or(task);

    Ok(Json(TriggerResponse {
        task,
        result: outcome.report,
    }))
}

pub async fn list_tasks(
    State(app): State<AppContext>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<TaskListResponse>> {
    let tasks = app.service.get_tasks(&query.email).await?;
    Ok(Json(TaskListResponse { tasks }))
}

pub async fn delete_task(
    State(app): State<AppContext>,
    Path(task_id): Path<TaskId>,
) -> ApiResult<StatusCode> {
    app.service.delete_task(task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn evaluate(
    State(app): State<AppContext>,
    Json(req): Json<EvaluateRequest>,
) -> ApiResult<Json<EvaluationReport>> {
    Ok(Json(app.service.evaluate(&req.summary, &req.sources).await?))
}

pub async fn broker_status(State(app): State<AppContext>) -> Json<BrokerStatus> {
    Json(app.service.bus().broker_status())
}

pub async fn health(State(app): State<AppContext>) -> (StatusCode, Json<HealthReport>) {
    let report = app.health().await;
    let status = match report.overall_status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(report))
}
