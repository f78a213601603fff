use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Zero active device tokens at campaign intake. A normal business
    /// outcome, distinguished from server faults.
    #[error("no active recipients")]
    NoRecipients,

    #[error("not found")]
    NotFound,

    /// Persistence or other unexpected failure before the response is sent.
    /// Provider/delivery errors never reach here: the dispatcher absorbs
    /// them into the campaign's terminal status.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Validation { field, reason } => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
                format!("{}: {}", field, reason),
            ),
            AppError::NoRecipients => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "no_recipients",
                "no active device tokens are registered".to_string(),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                "resource not found".to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
