pub mod execute;
pub mod sessions;
pub mod stats;
pub mod tasks;
pub mod webhooks;

use axum::http::StatusCode;

use super::errors::{ApiError, api_error};
use crate::core::types::{PRIORITY_MAX, PRIORITY_MIN};

pub(crate) fn validate_prompt(prompt: Option<&str>) -> Result<String, ApiError> {
    match prompt {
        Some(p) if !p.trim().is_empty() => Ok(p.to_string()),
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            "prompt is required and must be non-empty",
        )),
    }
}

pub(crate) fn validate_priority(priority: Option<u8>) -> Result<Option<u8>, ApiError> {
    match priority {
        Some(p) if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&p) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "priority must be between 1 and 10",
        )),
        other => Ok(other),
    }
}

pub(crate) fn validate_webhook_url(url: Option<&str>) -> Result<Option<String>, ApiError> {
    let Some(raw) = url else {
        return Ok(None);
    };
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(Some(raw.to_string())),
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            "webhook_url must be a well-formed http(s) URL",
        )),
    }
}

pub(crate) fn reject_streaming(stream: bool) -> Result<(), ApiError> {
    if stream {
        return Err(api_error(
            StatusCode::NOT_IMPLEMENTED,
            "Streaming is not implemented",
        ));
    }
    Ok(())
}
