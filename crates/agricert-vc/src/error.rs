use thiserror::Error;

use agricert_core::{AgriError, CanonicalizationError};

/// Errors raised while building, signing or encoding a credential.
#[derive(Error, Debug)]
pub enum VcError {
    /// The constructed document violates the required-field contract.
    #[error("Invalid VC structure: {}", .0.join(", "))]
    InvalidStructure(Vec<String>),

    /// Template could not be read or parsed.
    #[error("credential template error: {0}")]
    Template(String),

    /// Canonicalization of the signing input failed.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// The signing capability failed.
    #[error("signer failed: {0}")]
    Signer(String),

    /// The QR encoding capability failed.
    #[error("QR generation failed: {0}")]
    Qr(String),

    /// Date arithmetic on issuance/expiry overflowed.
    #[error("credential date out of range: {0}")]
    DateRange(String),

    /// JSON (de)serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<VcError> for AgriError {
    fn from(err: VcError) -> Self {
        match err {
            VcError::InvalidStructure(reasons) => AgriError::Validation(reasons),
            VcError::Signer(_) | VcError::Qr(_) => AgriError::ExternalService(err.to_string()),
            VcError::Canonicalization(e) => AgriError::Canonicalization(e),
            VcError::Template(_) | VcError::DateRange(_) | VcError::Serialization(_) => {
                AgriError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_failures_are_external_service() {
        let err: AgriError = VcError::Signer("timeout".into()).into();
        assert!(matches!(err, AgriError::ExternalService(_)));
        let err: AgriError = VcError::Qr("capacity".into()).into();
        assert!(matches!(err, AgriError::ExternalService(_)));
    }

    #[test]
    fn structure_failures_are_validation() {
        let err: AgriError = VcError::InvalidStructure(vec!["Missing required field: issuer".into()]).into();
        match err {
            AgriError::Validation(reasons) => assert_eq!(reasons.len(), 1),
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
