//! Task API endpoints
//!
//! RESTful API for task CRUD operations and batch processing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use taskhub_core::batch::BatchFailure;
use taskhub_core::task::{ListQuery, NewTask, Priority, Task, TaskId, TaskPatch, TaskStatus};

use super::{route_error, RouteError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchProcessRequest {
    pub task_ids: Vec<TaskId>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: u8,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub items: Vec<TaskResponse>,
    pub total: u64,
    pub skip: u64,
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct BatchProcessResponse {
    pub processed_count: usize,
    pub total_requested: usize,
    pub failed_ids: Vec<TaskId>,
    pub failures: Vec<BatchFailure>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            status: task.status,
            priority: task.priority.get(),
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/tasks - List tasks with pagination and optional status filter
async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<TaskListResponse>, RouteError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(route_error)?;
    let list_query = ListQuery::new(query.skip, query.limit, status).map_err(route_error)?;

    let page = state
        .task_store()
        .list(&list_query)
        .await
        .map_err(route_error)?;

    Ok(Json(TaskListResponse {
        items: page.items.into_iter().map(TaskResponse::from).collect(),
        total: page.total,
        skip: list_query.offset,
        limit: list_query.limit,
    }))
}

/// POST /api/tasks - Create a new task
async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), RouteError> {
    let mut task = NewTask::new(&req.title).map_err(route_error)?;

    if let Some(desc) = req.description {
        task = task.with_description(desc);
    }

    if let Some(priority) = req.priority {
        task = task.with_priority(Priority::new(priority).map_err(route_error)?);
    }

    let created = state.task_store().create(task).await.map_err(route_error)?;
    tracing::debug!(task_id = created.id, "Task created");

    Ok((StatusCode::CREATED, Json(TaskResponse::from(created))))
}

/// GET /api/tasks/{id} - Get a single task
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<Json<TaskResponse>, RouteError> {
    let task = state.task_store().get(id).await.map_err(route_error)?;
    Ok(Json(TaskResponse::from(task)))
}

/// PUT /api/tasks/{id} - Update a task
async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, RouteError> {
    let status = req
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(route_error)?;
    let patch =
        TaskPatch::new(req.title, req.description, status, req.priority).map_err(route_error)?;

    let updated = state
        .task_store()
        .update(id, patch)
        .await
        .map_err(route_error)?;

    Ok(Json(TaskResponse::from(updated)))
}

/// DELETE /api/tasks/{id} - Delete a task
async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<StatusCode, RouteError> {
    state.task_store().delete(id).await.map_err(route_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/tasks/process-batch - Mark tasks completed concurrently
async fn process_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchProcessRequest>,
) -> Result<Json<BatchProcessResponse>, RouteError> {
    let report = state
        .batch()
        .process_batch(&req.task_ids)
        .await
        .map_err(route_error)?;

    Ok(Json(BatchProcessResponse {
        processed_count: report.processed_count,
        total_requested: report.requested,
        failed_ids: report.failed_ids(),
        failures: report.failures,
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/process-batch", post(process_batch))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
}
