use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;
use crate::services::TrackerError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment network error: {message}")]
    BadGateway { reference: String, message: String },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Conflict(what) => AppError::Conflict(what),
            RepositoryError::Storage(msg) => AppError::Storage(msg),
        }
    }
}

impl From<TrackerError> for AppError {
    fn from(e: TrackerError) -> Self {
        match e {
            TrackerError::Validation(v) => v.into(),
            TrackerError::NotFound(reference) => AppError::NotFound(format!("payment request {}", reference)),
            TrackerError::Gateway { reference, source } => AppError::BadGateway {
                reference,
                message: source.to_string(),
            },
            TrackerError::ReferenceExhausted => AppError::Internal(e.to_string()),
            TrackerError::Store(store) => store.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = match &self {
            AppError::BadGateway { reference, message } => json!({
                "reference": reference,
                "status": "error",
                "message": message,
            }),
            other => json!({
                "status": "error",
                "message": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
