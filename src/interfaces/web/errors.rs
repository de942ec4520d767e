use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

/// Error surfaced at the HTTP boundary, rendered as the standard error
/// envelope `{"success": false, "error": ...}` with the mapped status code.
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub code: u16,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiError({}, {})", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::Json(serde_json::json!({
            "success": false,
            "error": self.message,
        }));
        (status, body).into_response()
    }
}

/// Helper to create API errors.
pub fn api_error(status: StatusCode, message: &str) -> ApiError {
    ApiError {
        message: message.to_string(),
        code: status.as_u16(),
    }
}
