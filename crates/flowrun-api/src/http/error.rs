//! Application error type mapping to HTTP status codes.
//!
//! Every error renders as `{ "success": false, "error": "<message>" }`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use flowrun_core::workflow::{ExecutorError, WorkflowError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Workflow catalog errors.
    Workflow(WorkflowError),
    /// Run creation, lookup and cancellation errors.
    Executor(ExecutorError),
    /// Malformed request (bad JSON, bad id, bad query).
    BadRequest(String),
    /// Resource exists but is not visible under this route.
    NotFound(String),
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl From<ExecutorError> for AppError {
    fn from(e: ExecutorError) -> Self {
        AppError::Executor(e)
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Workflow(WorkflowError::NotFound(name)) => {
                (StatusCode::NOT_FOUND, format!("workflow '{name}' not found"))
            }
            AppError::Workflow(WorkflowError::Conflict(name)) => {
                (StatusCode::CONFLICT, format!("workflow '{name}' already exists"))
            }
            AppError::Workflow(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Executor(e @ ExecutorError::Validation { .. }) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Executor(ExecutorError::NotFound(run_id)) => {
                (StatusCode::NOT_FOUND, format!("run {run_id} not found"))
            }
            AppError::Executor(e @ ExecutorError::IllegalState(_)) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            AppError::Executor(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
