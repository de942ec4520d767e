use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;

use super::super::AppState;
use super::super::errors::{ApiError, api_error};
use super::{reject_streaming, validate_prompt};
use crate::core::session_manager::{ContinueOutcome, ContinueRequest};
use crate::core::store::SessionListFilter;
use crate::core::types::{Metadata, SessionStatus};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub model: Option<String>,
    pub project_path: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// `POST /api/sessions`: 201 with the new session.
pub async fn create_session_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<axum::response::Response, ApiError> {
    let session = state
        .sessions
        .create(payload.model, payload.project_path, payload.metadata)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "session": session })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub status: Option<String>,
    pub project_path: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /api/sessions?status=&project_path=&limit=`
pub async fn list_sessions_endpoint(
    Query(query): Query<ListSessionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(SessionStatus::from_status(raw).ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, "Unknown session status filter")
        })?),
        None => None,
    };
    let sessions = state
        .sessions
        .list(SessionListFilter {
            status,
            project_path: query.project_path,
            limit: query.limit,
        })
        .await;
    Ok(Json(
        json!({ "success": true, "count": sessions.len(), "sessions": sessions }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SearchSessionsQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /api/sessions/search?q=&limit=`
pub async fn search_sessions_endpoint(
    Query(query): Query<SearchSessionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(q) = query.q.filter(|q| !q.trim().is_empty()) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "q is required"));
    };
    let sessions = state.sessions.search(&q, query.limit).await;
    Ok(Json(
        json!({ "success": true, "count": sessions.len(), "sessions": sessions }),
    ))
}

/// `GET /api/sessions/stats`
pub async fn session_stats_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.sessions.get_stats().await;
    Json(json!({ "success": true, "stats": stats }))
}

/// `GET /api/sessions/{id}`
pub async fn get_session_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.sessions.get(&id).await {
        Some(session) => Ok(Json(json!({ "success": true, "session": session }))),
        None => Err(api_error(StatusCode::NOT_FOUND, "Session not found")),
    }
}

/// `DELETE /api/sessions/{id}`
pub async fn delete_session_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state
        .sessions
        .delete(&id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    if !deleted {
        return Err(api_error(StatusCode::NOT_FOUND, "Session not found"));
    }
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionStatusRequest {
    pub status: Option<String>,
}

/// `PATCH /api/sessions/{id}/status`
pub async fn update_session_status_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateSessionStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = payload
        .status
        .as_deref()
        .and_then(SessionStatus::from_status)
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "status must be 'active' or 'archived'",
            )
        })?;
    let updated = state
        .sessions
        .update_status(&id, status)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found"))?;
    Ok(Json(json!({ "success": true, "session": updated })))
}

#[derive(Debug, Deserialize)]
pub struct ContinueSessionRequest {
    pub prompt: Option<String>,
    pub system_prompt: Option<String>,
    pub max_budget_usd: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

/// `POST /api/sessions/{id}/continue`: run one more prompt inside an
/// active session.
pub async fn continue_session_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ContinueSessionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let prompt = validate_prompt(payload.prompt.as_deref())?;
    reject_streaming(payload.stream)?;

    let outcome = state
        .sessions
        .continue_session(
            &id,
            ContinueRequest {
                prompt,
                system_prompt: payload.system_prompt,
                max_budget_usd: payload.max_budget_usd,
            },
        )
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    match outcome {
        ContinueOutcome::Executed(result) => {
            let body = serde_json::to_value(&result)
                .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
            Ok(Json(body))
        }
        ContinueOutcome::NotFound => Err(api_error(StatusCode::NOT_FOUND, "Session not found")),
        ContinueOutcome::NotActive(status) => Err(api_error(
            StatusCode::BAD_REQUEST,
            &format!("Cannot continue a {} session", status.as_str()),
        )),
    }
}
