//! # Verifiable Credential structure
//!
//! The typed envelope of an agricultural quality certificate. Documents
//! travel as `serde_json::Value` through signing and verification (a
//! verifier may hand us anything); this struct is the typed view used to
//! construct new documents and to read claims out of stored ones.
//!
//! Deserialization is lenient: unknown members are kept out of the typed
//! view but never rejected, because the signing input is the full JSON
//! value, not this struct.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agricert_core::Timestamp;

use crate::error::VcError;
use crate::proof::Proof;

/// The issuing organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// Deterministic DID of the issuing QA agency.
    pub id: String,
    pub name: String,
}

/// A W3C-style Verifiable Credential for an export batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    /// Credential URI (`urn:agricert:credential:VC-...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    pub issuer: Issuer,
    pub issuance_date: Timestamp,
    pub expiration_date: Timestamp,
    /// Batch, inspection and quality snapshot. Kept untyped; verifiers
    /// may present subjects with extra fields.
    pub credential_subject: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl VerifiableCredential {
    /// Typed view of a document.
    pub fn from_value(document: &Value) -> Result<Self, VcError> {
        Ok(serde_json::from_value(document.clone())?)
    }

    /// The document as JSON, ready for signing or storage.
    pub fn to_value(&self) -> Result<Value, VcError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Whether the type marker includes `VerifiableCredential`.
    pub fn is_verifiable_credential(&self) -> bool {
        self.credential_type.iter().any(|t| t == "VerifiableCredential")
    }

    /// The batch number claimed in the subject.
    pub fn batch_id(&self) -> Option<&str> {
        claimed_batch_id(&self.credential_subject)
    }

    pub fn is_expired_at(&self, at: Timestamp) -> bool {
        self.expiration_date < at
    }
}

// ── Readers over raw documents ──────────────────────────────────────────────
//
// Verification works on whatever the verifier submitted, which may not
// deserialize into the typed struct at all.

/// `credentialSubject.batchId`, as a string.
pub fn claimed_batch_id(subject: &Value) -> Option<&str> {
    subject.get("batchId").and_then(Value::as_str)
}

/// `credentialSubject.batchId` from a full document.
pub fn document_batch_id(document: &Value) -> Option<&str> {
    document.get("credentialSubject").and_then(claimed_batch_id)
}

/// `proof.proofValue` from a full document.
pub fn document_proof_value(document: &Value) -> Option<&str> {
    document
        .get("proof")
        .and_then(|p| p.get("proofValue"))
        .and_then(Value::as_str)
}

/// `expirationDate` from a full document, if present and parseable.
pub fn document_expiration(document: &Value) -> Option<Timestamp> {
    document
        .get("expirationDate")
        .and_then(Value::as_str)
        .and_then(|s| Timestamp::parse_lenient(s).ok())
}

/// The document `id` member (`urn:agricert:credential:VC-...`).
pub fn document_id(document: &Value) -> Option<&str> {
    document.get("id").and_then(Value::as_str)
}
