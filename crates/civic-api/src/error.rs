//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps workflow errors to HTTP status codes and JSON bodies carrying a
//! stable machine-readable code. Internal error details never reach clients.
//!
//! `INVALID_TRANSITION` and `VERSION_CONFLICT` share status 409; clients
//! tell them apart by `error.code`, because only the latter is retryable.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use civic_workflow::WorkflowError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VERSION_CONFLICT").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional context, e.g. `current_version` on a version conflict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Input failed a business rule (400).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body or query could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller's role may not perform the operation (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Action is not legal from the request's current status (409).
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Caller's version is stale (409). Re-read and retry.
    #[error("version conflict: {message}")]
    VersionConflict {
        message: String,
        expected_version: u64,
        current_version: u64,
    },

    /// Storage backend failure (500). Message is logged but not returned.
    #[error("store error: {0}")]
    Store(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            Self::VersionConflict { .. } => (StatusCode::CONFLICT, "VERSION_CONFLICT"),
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::VersionConflict {
                expected_version,
                current_version,
                ..
            } => Some(serde_json::json!({
                "expected_version": expected_version,
                "current_version": current_version,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if self.is_internal() {
            tracing::error!(error = %self, code, "internal server error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<civic_core::ValidationError> for AppError {
    fn from(err: civic_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::NotFound(_) => Self::NotFound(err.to_string()),
            WorkflowError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
            WorkflowError::Forbidden { .. } => Self::Forbidden(err.to_string()),
            WorkflowError::VersionConflict {
                expected, current, ..
            } => Self::VersionConflict {
                message: err.to_string(),
                expected_version: expected,
                current_version: current,
            },
            WorkflowError::Validation(msg) => Self::Validation(msg),
            WorkflowError::Store(msg) => Self::Store(msg),
        }
    }
}
