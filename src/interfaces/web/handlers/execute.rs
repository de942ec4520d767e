use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::super::AppState;
use super::super::errors::{ApiError, api_error};
use super::{reject_streaming, validate_priority, validate_prompt, validate_webhook_url};
use crate::core::executor::ExecuteRequest;
use crate::core::store::RequestOutcome;
use crate::core::types::{Metadata, NewTask};

#[derive(Debug, Deserialize)]
pub struct ExecuteApiRequest {
    pub prompt: Option<String>,
    pub project_path: Option<String>,
    pub model: Option<String>,
    pub session_id: Option<String>,
    pub system_prompt: Option<String>,
    pub max_budget_usd: Option<f64>,
    pub allowed_tools: Option<Vec<String>>,
    pub disallowed_tools: Option<Vec<String>>,
    pub agent: Option<String>,
    pub mcp_config: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(rename = "async", default)]
    pub run_async: bool,
    pub priority: Option<u8>,
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ExecuteApiRequest {
    fn executor_request(&self, prompt: String, state: &AppState) -> ExecuteRequest {
        ExecuteRequest {
            prompt,
            project_path: self
                .project_path
                .clone()
                .unwrap_or_else(|| state.config.default_project_path.clone()),
            model: Some(
                self.model
                    .clone()
                    .unwrap_or_else(|| state.config.default_model.clone()),
            ),
            session_id: self.session_id.clone(),
            system_prompt: self.system_prompt.clone(),
            max_budget_usd: self.max_budget_usd,
            allowed_tools: self.allowed_tools.clone(),
            disallowed_tools: self.disallowed_tools.clone(),
            agent: self.agent.clone(),
            mcp_config: self.mcp_config.clone(),
        }
    }

    /// Fold executor options and the webhook override into task metadata so
    /// the scheduler worker can reconstruct the invocation later.
    fn task_metadata(&self, webhook_url: Option<&str>) -> Metadata {
        let mut metadata = self.metadata.clone();
        if let Some(url) = webhook_url {
            metadata.insert("webhook_url".to_string(), json!(url));
        }
        if let Some(v) = &self.system_prompt {
            metadata.insert("system_prompt".to_string(), json!(v));
        }
        if let Some(v) = self.max_budget_usd {
            metadata.insert("max_budget_usd".to_string(), json!(v));
        }
        if let Some(v) = &self.allowed_tools {
            metadata.insert("allowed_tools".to_string(), json!(v));
        }
        if let Some(v) = &self.disallowed_tools {
            metadata.insert("disallowed_tools".to_string(), json!(v));
        }
        if let Some(v) = &self.agent {
            metadata.insert("agent".to_string(), json!(v));
        }
        if let Some(v) = &self.mcp_config {
            metadata.insert("mcp_config".to_string(), json!(v));
        }
        metadata
    }
}

/// `POST /api/claude`: synchronous execution unless `async=true`, in which
/// case the prompt is queued and a 202 ticket is returned.
pub async fn execute_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<ExecuteApiRequest>,
) -> Result<axum::response::Response, ApiError> {
    let prompt = validate_prompt(payload.prompt.as_deref())?;
    let priority = validate_priority(payload.priority)?;
    let webhook_url = validate_webhook_url(payload.webhook_url.as_deref())?;
    reject_streaming(payload.stream)?;

    if payload.run_async {
        // Queue path: make sure a session exists first, so the ticket always
        // carries one.
        let session_id = match &payload.session_id {
            Some(id) => id.clone(),
            None => {
                state
                    .sessions
                    .create(
                        payload.model.clone(),
                        payload.project_path.clone(),
                        Metadata::new(),
                    )
                    .await
                    .map_err(|e| {
                        api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
                    })?
                    .id
            }
        };

        let task = state
            .scheduler
            .submit(NewTask {
                prompt,
                project_path: payload
                    .project_path
                    .clone()
                    .unwrap_or_else(|| state.config.default_project_path.clone()),
                model: payload
                    .model
                    .clone()
                    .unwrap_or_else(|| state.config.default_model.clone()),
                priority,
                session_id: Some(session_id.clone()),
                metadata: payload.task_metadata(webhook_url.as_deref()),
            })
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

        info!("Queued task {} (priority {})", task.id, task.priority);
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "task_id": task.id,
                "status": task.status,
                "priority": task.priority,
                "session_id": session_id,
                "webhook_url": webhook_url,
            })),
        )
            .into_response());
    }

    // Sync path: run the executor inline and report the outcome directly.
    let request = payload.executor_request(prompt, &state);
    let model = request.model.clone().unwrap_or_default();
    let result = state
        .executor
        .execute(request)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    if result.success {
        if let Some(session_id) = &payload.session_id {
            if let Err(e) = state.sessions.accrue(session_id, result.cost_usd).await {
                warn!("Failed to accrue cost on session {}: {}", session_id, e);
            }
        }
    }
    if let Err(e) = state
        .stats
        .record_request(RequestOutcome {
            success: result.success,
            input_tokens: result.usage.input_tokens,
            output_tokens: result.usage.output_tokens,
            cost_usd: result.cost_usd,
            model,
        })
        .await
    {
        warn!("Failed to record statistics: {}", e);
    }

    let body = serde_json::to_value(&result)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok(Json(body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub prompts: Option<Vec<String>>,
    pub project_path: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_budget_usd: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

const BATCH_MAX: usize = 10;

/// `POST /api/claude/batch`: up to ten prompts executed concurrently,
/// synchronously, with per-item results and a summary.
pub async fn batch_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<BatchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    reject_streaming(payload.stream)?;
    let prompts = match &payload.prompts {
        Some(prompts) if !prompts.is_empty() && prompts.len() <= BATCH_MAX => prompts.clone(),
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "prompts must contain between 1 and 10 entries",
            ));
        }
    };
    for prompt in &prompts {
        validate_prompt(Some(prompt))?;
    }

    let mut handles = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        let executor = state.executor.clone();
        let request = ExecuteRequest {
            prompt,
            project_path: payload
                .project_path
                .clone()
                .unwrap_or_else(|| state.config.default_project_path.clone()),
            model: Some(
                payload
                    .model
                    .clone()
                    .unwrap_or_else(|| state.config.default_model.clone()),
            ),
            system_prompt: payload.system_prompt.clone(),
            max_budget_usd: payload.max_budget_usd,
            ..ExecuteRequest::default()
        };
        handles.push(tokio::spawn(async move { executor.execute(request).await }));
    }

    let model = payload
        .model
        .clone()
        .unwrap_or_else(|| state.config.default_model.clone());
    let mut results = Vec::with_capacity(handles.len());
    let mut succeeded = 0usize;
    for handle in handles {
        let item = match handle.await {
            Ok(Ok(result)) => {
                if result.success {
                    succeeded += 1;
                }
                if let Err(e) = state
                    .stats
                    .record_request(RequestOutcome {
                        success: result.success,
                        input_tokens: result.usage.input_tokens,
                        output_tokens: result.usage.output_tokens,
                        cost_usd: result.cost_usd,
                        model: model.clone(),
                    })
                    .await
                {
                    warn!("Failed to record statistics: {}", e);
                }
                serde_json::to_value(&result).unwrap_or(json!({ "success": false }))
            }
            Ok(Err(e)) => json!({ "success": false, "error": e.to_string() }),
            Err(e) => json!({ "success": false, "error": format!("join error: {e}") }),
        };
        results.push(item);
    }

    let total = results.len();
    Ok(Json(json!({
        "success": true,
        "results": results,
        "summary": {
            "total": total,
            "succeeded": succeeded,
            "failed": total - succeeded,
        },
    })))
}
