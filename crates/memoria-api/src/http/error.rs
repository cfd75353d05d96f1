//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use memoria_core::extraction::service::ExtractionError;
use memoria_types::error::ValidationError;
use memoria_types::workflow::WorkflowError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Extraction(ExtractionError),
    /// A synchronously run dispatch did not complete.
    Workflow(WorkflowError),
    /// Malformed path or body.
    BadRequest(String),
}

impl From<ExtractionError> for AppError {
    fn from(e: ExtractionError) -> Self {
        AppError::Extraction(e)
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Extraction(ExtractionError::Validation(e))
    }
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Extraction(ExtractionError::Validation(e)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string())
            }
            AppError::Extraction(ExtractionError::TaskNotFound(id)) => {
                (StatusCode::NOT_FOUND, "TASK_NOT_FOUND", format!("Task {id} not found"))
            }
            AppError::Extraction(e @ ExtractionError::Scheduling { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TASK_TRIGGER_ERROR", e.to_string())
            }
            AppError::Extraction(e @ ExtractionError::Repository(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string())
            }
            AppError::Workflow(WorkflowError::Abort) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "WORKFLOW_ABORTED",
                "Workflow was cancelled before it finished".to_string(),
            ),
            AppError::Workflow(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DISPATCH_ERROR", e.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }
        (status, Json(ApiResponse::error(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn status_codes() {
        let cases = [
            (
                AppError::from(ValidationError::field("userIds", "missing")),
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
            ),
            (
                AppError::from(ExtractionError::TaskNotFound(Uuid::nil())),
                StatusCode::NOT_FOUND,
                "TASK_NOT_FOUND",
            ),
            (
                AppError::from(ExtractionError::Scheduling {
                    task_id: Uuid::nil(),
                    message: "down".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
                "TASK_TRIGGER_ERROR",
            ),
            (
                AppError::from(WorkflowError::Abort),
                StatusCode::INTERNAL_SERVER_ERROR,
                "WORKFLOW_ABORTED",
            ),
        ];

        for (err, status, code) in cases {
            let (s, c, _) = err.parts();
            assert_eq!(s, status);
            assert_eq!(c, code);
        }
    }
}
