//! Error types for alfri-ml
//!
//! Every handler error renders as `{"error": {"code", "message", "details"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::services::{ClusteringError, PredictionError, ValidationError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or invalid request (400)
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// Subject id not present in the requested program (404)
    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Well-formed request with unusable content (422)
    #[error("Unprocessable request: {0}")]
    Unprocessable(String),

    /// Model registry not loaded yet (503)
    #[error("Models not loaded: {0}")]
    ModelNotLoaded(String),

    /// A dependency (model, data source) is unavailable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::SubjectNotFound(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ModelNotLoaded(_) | ApiError::ServiceUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::SubjectNotFound(_) => "SUBJECT_NOT_FOUND",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unprocessable(_) => "UNPROCESSABLE",
            ApiError::ModelNotLoaded(_) => "MODEL_NOT_LOADED",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, details) = match self {
            ApiError::Validation { message, details } => (message, details),
            ApiError::Internal(detail) => {
                // Detail stays in the log, never in the response
                error!("Internal error: {}", detail);
                ("Internal server error".to_string(), None)
            }
            ApiError::SubjectNotFound(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::ModelNotLoaded(msg)
            | ApiError::ServiceUnavailable(msg) => (msg, None),
        };

        let mut body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });
        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation {
            message: err.message,
            details: err.details,
        }
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        match err {
            PredictionError::Validation(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ClusteringError> for ApiError {
    fn from(err: ClusteringError) -> Self {
        match err {
            ClusteringError::Invalid(msg) => ApiError::Unprocessable(msg),
            ClusteringError::UnknownProgram(_) => ApiError::Unprocessable(err.to_string()),
            ClusteringError::NotReady => ApiError::ModelNotLoaded(err.to_string()),
            ClusteringError::ModelMissing(_) => ApiError::ServiceUnavailable(err.to_string()),
            ClusteringError::SubjectNotFound { .. } => ApiError::SubjectNotFound(err.to_string()),
            ClusteringError::NoSubjects(_) | ClusteringError::NoCandidates => {
                ApiError::NotFound(err.to_string())
            }
            ClusteringError::Source(_) | ClusteringError::Prediction(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
