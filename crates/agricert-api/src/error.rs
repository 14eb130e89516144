//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps the lifecycle taxonomy (`AgriError`) and ledger errors to HTTP
//! status codes and the `{status: "error", message, code, errors}`
//! envelope. Internal error details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use agricert_core::AgriError;

use crate::store::StoreError;

/// Error envelope returned by every failing request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Always `"error"`.
    pub status: String,
    pub message: String,
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Every failed rule, for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// One or more input rules failed (400).
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    /// Request body or query could not be parsed (400).
    #[error("{0}")]
    BadRequest(String),

    /// Operation not allowed in the current lifecycle state (400).
    #[error("{0}")]
    InvalidState(String),

    /// Missing or invalid token (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Role or ownership denial (403).
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate issuance or another lost write race (409).
    #[error("{0}")]
    Conflict(String),

    /// Signer or QR encoder failed; nothing was persisted (502).
    #[error("{0}")]
    ExternalService(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::InvalidState(_) => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "ACCESS_DENIED"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::ExternalService(_) => (StatusCode::BAD_GATEWAY, "EXTERNAL_SERVICE_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::ExternalService(_) => {
                "Credential signing or encoding failed; nothing was issued".to_string()
            }
            Self::Validation(reasons) if reasons.len() > 1 => "Validation failed".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::ExternalService(_) => tracing::error!(error = %self, "external service failure"),
            _ => {}
        }

        let errors = match self {
            Self::Validation(reasons) => Some(reasons),
            _ => None,
        };

        let body = ErrorBody {
            status: "error".to_string(),
            message,
            code: code.to_string(),
            errors,
        };

        (status, Json(body)).into_response()
    }
}

impl From<AgriError> for AppError {
    fn from(err: AgriError) -> Self {
        match err {
            AgriError::Validation(reasons) => Self::Validation(reasons),
            AgriError::NotFound(msg) => Self::NotFound(msg),
            AgriError::AccessDenied(msg) => Self::Forbidden(msg),
            AgriError::InvalidState(msg) => Self::InvalidState(msg),
            AgriError::Conflict(msg) => Self::Conflict(msg),
            AgriError::ExternalService(msg) => Self::ExternalService(msg),
            AgriError::Canonicalization(_) | AgriError::Internal(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AgriError::from(err).into()
    }
}
