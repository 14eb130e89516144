//! # Error Types: Lifecycle Error Taxonomy
//!
//! Every operation on batches, inspections and credentials fails with one
//! of the [`AgriError`] classes. The class tells the caller what to do:
//!
//! - `Validation`: fix the request (each reason is reported).
//! - `NotFound`: the entity does not exist.
//! - `AccessDenied`: role or ownership check failed.
//! - `InvalidState`: the lifecycle state forbids the operation.
//! - `Conflict`: a concurrent or duplicate write lost (double issuance).
//! - `ExternalService`: the signer or QR encoder failed; nothing was persisted.
//!
//! Business-rule violations are detected before any write, so a returned
//! error always means "nothing happened".

use thiserror::Error;

/// Top-level error type for the certification lifecycle.
#[derive(Error, Debug)]
pub enum AgriError {
    /// Malformed or out-of-range input. Carries every failed rule.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Entity missing.
    #[error("{0}")]
    NotFound(String),

    /// Role or ownership violation.
    #[error("{0}")]
    AccessDenied(String),

    /// Operation not permitted in the current lifecycle state.
    #[error("{0}")]
    InvalidState(String),

    /// Duplicate or concurrently superseded write.
    #[error("{0}")]
    Conflict(String),

    /// Signer or encoder failure.
    #[error("external service failed: {0}")]
    ExternalService(String),

    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Storage or other infrastructure failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgriError {
    /// Shorthand for a single-reason validation error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Validation(vec![reason.into()])
    }

    /// Machine-readable class name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AccessDenied(_) => "ACCESS_DENIED",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Canonicalization(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// The value is not representable in canonical JSON.
    #[error("value not canonicalizable: {0}")]
    Unrepresentable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_joins_reasons() {
        let err = AgriError::Validation(vec![
            "Unit is required".into(),
            "Quantity must be greater than 0".into(),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: Unit is required; Quantity must be greater than 0"
        );
    }

    #[test]
    fn invalid_shorthand() {
        match AgriError::invalid("bad") {
            AgriError::Validation(reasons) => assert_eq!(reasons, vec!["bad".to_string()]),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn kinds_are_distinct_per_class() {
        assert_eq!(AgriError::NotFound("x".into()).kind(), "NOT_FOUND");
        assert_eq!(AgriError::AccessDenied("x".into()).kind(), "ACCESS_DENIED");
        assert_eq!(AgriError::InvalidState("x".into()).kind(), "INVALID_STATE");
        assert_eq!(AgriError::Conflict("x".into()).kind(), "CONFLICT");
        assert_eq!(
            AgriError::ExternalService("x".into()).kind(),
            "EXTERNAL_SERVICE_ERROR"
        );
        assert_eq!(AgriError::Internal("x".into()).kind(), "INTERNAL_ERROR");
    }

    #[test]
    fn messages_pass_through_unprefixed() {
        let err = AgriError::InvalidState("Inspection result already submitted".into());
        assert_eq!(err.to_string(), "Inspection result already submitted");
    }
}
