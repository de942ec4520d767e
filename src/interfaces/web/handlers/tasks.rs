use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;

use super::super::AppState;
use super::super::errors::{ApiError, api_error};
use super::{validate_priority, validate_prompt, validate_webhook_url};
use crate::core::scheduler::CancelOutcome;
use crate::core::store::TaskListFilter;
use crate::core::types::{Metadata, NewTask, TaskPatch, TaskStatus};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub prompt: Option<String>,
    pub project_path: Option<String>,
    pub model: Option<String>,
    pub session_id: Option<String>,
    pub priority: Option<u8>,
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// `POST /api/tasks/async`: create a queued task, 201 with the record.
pub async fn create_async_task_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<axum::response::Response, ApiError> {
    let prompt = validate_prompt(payload.prompt.as_deref())?;
    let priority = validate_priority(payload.priority)?;
    let webhook_url = validate_webhook_url(payload.webhook_url.as_deref())?;

    let mut metadata = payload.metadata;
    if let Some(url) = &webhook_url {
        metadata.insert("webhook_url".to_string(), json!(url));
    }

    let task = state
        .scheduler
        .submit(NewTask {
            prompt,
            project_path: payload
                .project_path
                .unwrap_or_else(|| state.config.default_project_path.clone()),
            model: payload
                .model
                .unwrap_or_else(|| state.config.default_model.clone()),
            priority,
            session_id: payload.session_id,
            metadata,
        })
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "task": task })),
    )
        .into_response())
}

/// `GET /api/tasks/{id}`
pub async fn get_task_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.tasks.get(&id).await {
        Some(task) => Ok(Json(json!({ "success": true, "task": task }))),
        None => Err(api_error(StatusCode::NOT_FOUND, "Task not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /api/tasks?status=&limit=`
pub async fn list_tasks_endpoint(
    Query(query): Query<ListTasksQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(TaskStatus::from_status(raw).ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, "Unknown task status filter")
        })?),
        None => None,
    };
    let tasks = state
        .tasks
        .list(TaskListFilter {
            status,
            limit: query.limit,
        })
        .await;
    Ok(Json(json!({ "success": true, "count": tasks.len(), "tasks": tasks })))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: Option<u8>,
}

/// `PATCH /api/tasks/{id}/priority`: allowed only while the task is still
/// pending or processing; takes effect on the next dispatch round.
pub async fn update_priority_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpdatePriorityRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let priority = validate_priority(payload.priority)?
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "priority is required"))?;

    let Some(task) = state.tasks.get(&id).await else {
        return Err(api_error(StatusCode::NOT_FOUND, "Task not found"));
    };
    if task.status.is_terminal() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            &format!("Cannot change priority of a {} task", task.status.as_str()),
        ));
    }

    let updated = state
        .tasks
        .update(
            &id,
            TaskPatch {
                priority: Some(priority),
                ..TaskPatch::default()
            },
        )
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Task not found"))?;

    Ok(Json(json!({ "success": true, "task": updated })))
}

/// `DELETE /api/tasks/{id}`: cancel; refuses terminal tasks.
pub async fn cancel_task_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .scheduler
        .cancel_task(&id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    match outcome {
        CancelOutcome::Cancelled(task) => Ok(Json(json!({ "success": true, "task": task }))),
        CancelOutcome::NotFound => Err(api_error(StatusCode::NOT_FOUND, "Task not found")),
        CancelOutcome::InvalidState(status) => Err(api_error(
            StatusCode::BAD_REQUEST,
            &format!("Cannot cancel a {} task", status.as_str()),
        )),
    }
}

/// `GET /api/tasks/queue/status`
pub async fn queue_status_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.scheduler.status().await;
    let mut body = serde_json::to_value(&status).unwrap_or_else(|_| json!({}));
    if let Some(map) = body.as_object_mut() {
        map.insert("success".to_string(), json!(true));
    }
    Json(body)
}
