use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::super::AppState;
use super::super::errors::{ApiError, api_error};
use super::validate_webhook_url;

#[derive(Debug, Deserialize)]
pub struct SendEventRequest {
    pub event: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    pub url: Option<String>,
}

/// `POST /api/webhooks/send`: deliver an arbitrary event through the
/// dispatcher and report the delivery outcome.
pub async fn send_event_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<SendEventRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let event = match payload.event.as_deref() {
        Some(e) if !e.trim().is_empty() => e.to_string(),
        _ => return Err(api_error(StatusCode::BAD_REQUEST, "event is required")),
    };
    let url = validate_webhook_url(payload.url.as_deref())?;

    let outcome = state
        .webhooks
        .deliver(&event, &payload.data, url.as_deref())
        .await;
    Ok(Json(json!({
        "success": outcome.delivered(),
        "delivery": outcome,
    })))
}
