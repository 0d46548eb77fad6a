//! Error types for convoyd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use convoy_inventory::InventoryError;
use convoy_invoker::InvokeError;
use convoy_scheduler::SchedulerError;
use convoy_store::StoreError;
use convoy_worker::WorkerError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Invoker error: {0}")]
    Invoker(#[from] InvokeError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_)
            | ApiError::Storage(StoreError::NotFound(_))
            | ApiError::Inventory(InventoryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            ApiError::BadRequest(_)
            | ApiError::Storage(StoreError::InvalidReason(_))
            | ApiError::Inventory(InventoryError::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            ApiError::Conflict(_)
            | ApiError::Storage(StoreError::Concurrency(_))
            | ApiError::Storage(StoreError::FinalState { .. })
            | ApiError::Storage(StoreError::AlreadyFinished(_)) => {
                (StatusCode::CONFLICT, "CONFLICT")
            }
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Scheduler(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SCHEDULER_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
