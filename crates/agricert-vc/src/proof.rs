//! # Proof block
//!
//! The proof object a signer attaches to a credential document:
//! `{type, created, proofPurpose, verificationMethod, proofValue}`.
//!
//! The signing input is always the JCS-canonicalized document with the
//! `proof` member removed, so a signed document can be re-verified from
//! any JSON serialization of it (QR scan, download, database row).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agricert_core::{CanonicalBytes, Timestamp};

use crate::error::VcError;

/// The purpose of a proof, per the VC Data Integrity vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProofPurpose {
    /// The issuer asserts the claims are true.
    AssertionMethod,
    /// Authentication of the holder.
    Authentication,
}

impl std::fmt::Display for ProofPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProofPurpose::AssertionMethod => write!(f, "assertionMethod"),
            ProofPurpose::Authentication => write!(f, "authentication"),
        }
    }
}

/// A proof attached to a credential document.
///
/// `proof_type` is kept as a string: the document may have been produced
/// by either the Ed25519 signer or the hash placeholder, and a verifier
/// dispatches on it rather than failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: Timestamp,
    #[serde(rename = "proofPurpose")]
    pub proof_purpose: ProofPurpose,
    #[serde(rename = "verificationMethod")]
    pub verification_method: String,
    #[serde(rename = "proofValue")]
    pub proof_value: String,
}

impl Proof {
    /// An `assertionMethod` proof created now.
    pub fn assertion(
        proof_type: impl Into<String>,
        verification_method: impl Into<String>,
        proof_value: impl Into<String>,
    ) -> Self {
        Self {
            proof_type: proof_type.into(),
            created: Timestamp::now(),
            proof_purpose: ProofPurpose::AssertionMethod,
            verification_method: verification_method.into(),
            proof_value: proof_value.into(),
        }
    }

    /// Read the proof block out of a document, if present and well-formed.
    pub fn from_document(document: &Value) -> Option<Self> {
        document
            .get("proof")
            .and_then(|p| serde_json::from_value(p.clone()).ok())
    }
}

/// Canonical signing input: the document without its `proof` member.
pub fn signing_input(document: &Value) -> Result<CanonicalBytes, VcError> {
    let mut body = document.clone();
    if let Some(obj) = body.as_object_mut() {
        obj.remove("proof");
    }
    Ok(CanonicalBytes::from_value(&body)?)
}

/// Attach a proof to a document, replacing any existing one.
pub fn attach(document: &Value, proof: &Proof) -> Result<Value, VcError> {
    let mut signed = document.clone();
    let obj = signed
        .as_object_mut()
        .ok_or_else(|| VcError::Signer("credential document must be a JSON object".into()))?;
    obj.insert("proof".to_string(), serde_json::to_value(proof)?);
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn proof_serializes_with_camel_case_members() {
        let proof = Proof {
            proof_type: "Ed25519Signature2020".into(),
            created: Timestamp::parse("2026-01-15T12:00:00Z").unwrap(),
            proof_purpose: ProofPurpose::AssertionMethod,
            verification_method: "did:web:agriqcert.org#key-1".into(),
            proof_value: "abc".into(),
        };
        let v = serde_json::to_value(&proof).unwrap();
        assert_eq!(v["type"], "Ed25519Signature2020");
        assert_eq!(v["created"], "2026-01-15T12:00:00Z");
        assert_eq!(v["proofPurpose"], "assertionMethod");
        assert_eq!(v["verificationMethod"], "did:web:agriqcert.org#key-1");
        assert_eq!(v["proofValue"], "abc");
    }

    #[test]
    fn signing_input_ignores_proof() {
        let unsigned = json!({"b": 1, "a": "x"});
        let signed = json!({"a": "x", "b": 1, "proof": {"proofValue": "zzz"}});
        assert_eq!(
            signing_input(&unsigned).unwrap().as_bytes(),
            signing_input(&signed).unwrap().as_bytes()
        );
        assert_eq!(signing_input(&unsigned).unwrap().as_str().unwrap(), r#"{"a":"x","b":1}"#);
    }

    #[test]
    fn attach_replaces_existing_proof() {
        let doc = json!({"a": 1, "proof": {"proofValue": "old"}});
        let proof = Proof::assertion("PlaceholderSha256", "did:web:agriqcert.org#key-1", "new");
        let signed = attach(&doc, &proof).unwrap();
        assert_eq!(signed["proof"]["proofValue"], "new");
        assert_eq!(Proof::from_document(&signed).unwrap().proof_value, "new");
    }

    #[test]
    fn attach_rejects_non_object() {
        let proof = Proof::assertion("t", "m", "v");
        assert!(attach(&json!([1, 2]), &proof).is_err());
    }

    #[test]
    fn from_document_tolerates_missing_or_malformed_proof() {
        assert!(Proof::from_document(&json!({"a": 1})).is_none());
        assert!(Proof::from_document(&json!({"proof": "nope"})).is_none());
    }

    #[test]
    fn purpose_display_matches_serde() {
        assert_eq!(ProofPurpose::AssertionMethod.to_string(), "assertionMethod");
        assert_eq!(
            serde_json::to_value(ProofPurpose::Authentication).unwrap(),
            json!("authentication")
        );
    }
}
