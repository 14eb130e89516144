//! # Signer capability
//!
//! Issuance hands the unsigned document to a [`Signer`] and gets back the
//! same document with a proof block attached. Verification asks the same
//! signer whether a proof is valid for the document it is attached to.
//!
//! Two implementations:
//!
//! - [`Ed25519Signer`]: `Ed25519Signature2020` over the JCS signing input,
//!   `proofValue` is the base64url (unpadded) signature.
//! - [`PlaceholderSigner`]: SHA-256 of the signing input. Detects
//!   tampering, proves nothing about authorship. For local development
//!   and for deployments where signing is delegated elsewhere.
//!
//! The trait is async so a remote signing service can be substituted
//! without touching the lifecycle engine.

use async_trait::async_trait;
use serde_json::Value;

use agricert_core::sha256_hex;
use agricert_crypto::{verify_with_public_key, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

use crate::error::VcError;
use crate::proof::{attach, signing_input, Proof};

pub const ED25519_PROOF_TYPE: &str = "Ed25519Signature2020";
pub const PLACEHOLDER_PROOF_TYPE: &str = "Sha256PlaceholderSignature";

/// A document with its proof attached, plus the raw proof value.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    pub document: Value,
    pub signature: String,
}

/// Outcome of a signature check. `reason` is set when `valid` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCheck {
    pub valid: bool,
    pub reason: Option<String>,
}

impl SignatureCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait Signer: Send + Sync {
    /// DID URL of the key this signer proves with.
    fn verification_method(&self) -> &str;

    /// Sign `document`. Any existing proof is replaced.
    async fn sign(&self, document: &Value) -> Result<SignedDocument, VcError>;

    /// Check the proof attached to `document`.
    async fn verify(&self, document: &Value) -> SignatureCheck;
}

/// Extract the proof and check that it was produced by a signer of
/// `expected_type`.
fn expect_proof(document: &Value, expected_type: &str) -> Result<Proof, SignatureCheck> {
    let proof = Proof::from_document(document)
        .ok_or_else(|| SignatureCheck::invalid("No proof found in credential"))?;
    if proof.proof_type != expected_type {
        return Err(SignatureCheck::invalid(format!(
            "unsupported proof type: {}",
            proof.proof_type
        )));
    }
    Ok(proof)
}

// ── Ed25519 ─────────────────────────────────────────────────────────────────

pub struct Ed25519Signer {
    key: Ed25519KeyPair,
    public_key: Ed25519PublicKey,
    verification_method: String,
}

impl Ed25519Signer {
    pub fn new(key: Ed25519KeyPair, verification_method: impl Into<String>) -> Self {
        let public_key = key.public_key();
        Self {
            key,
            public_key,
            verification_method: verification_method.into(),
        }
    }

    pub fn public_key(&self) -> &Ed25519PublicKey {
        &self.public_key
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &self.public_key)
            .field("verification_method", &self.verification_method)
            .finish()
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    fn verification_method(&self) -> &str {
        &self.verification_method
    }

    async fn sign(&self, document: &Value) -> Result<SignedDocument, VcError> {
        let input = signing_input(document)?;
        let signature = self.key.sign(&input).to_base64url();
        let proof = Proof::assertion(ED25519_PROOF_TYPE, &self.verification_method, &signature);
        Ok(SignedDocument {
            document: attach(document, &proof)?,
            signature,
        })
    }

    async fn verify(&self, document: &Value) -> SignatureCheck {
        verify_ed25519_document(document, &self.public_key)
    }
}

/// Offline check of an Ed25519-signed document against a known public key.
pub fn verify_ed25519_document(document: &Value, public_key: &Ed25519PublicKey) -> SignatureCheck {
    let proof = match expect_proof(document, ED25519_PROOF_TYPE) {
        Ok(p) => p,
        Err(check) => return check,
    };
    let signature = match Ed25519Signature::from_base64url(&proof.proof_value) {
        Ok(s) => s,
        Err(_) => return SignatureCheck::invalid("malformed proof value"),
    };
    let input = match signing_input(document) {
        Ok(i) => i,
        Err(e) => return SignatureCheck::invalid(e.to_string()),
    };
    match verify_with_public_key(&input, &signature, public_key) {
        Ok(()) => SignatureCheck::ok(),
        Err(_) => SignatureCheck::invalid("invalid signature"),
    }
}

// ── Placeholder ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PlaceholderSigner {
    verification_method: String,
}

impl PlaceholderSigner {
    pub fn new(verification_method: impl Into<String>) -> Self {
        Self {
            verification_method: verification_method.into(),
        }
    }
}

#[async_trait]
impl Signer for PlaceholderSigner {
    fn verification_method(&self) -> &str {
        &self.verification_method
    }

    async fn sign(&self, document: &Value) -> Result<SignedDocument, VcError> {
        let signature = sha256_hex(&signing_input(document)?);
        let proof = Proof::assertion(PLACEHOLDER_PROOF_TYPE, &self.verification_method, &signature);
        Ok(SignedDocument {
            document: attach(document, &proof)?,
            signature,
        })
    }

    async fn verify(&self, document: &Value) -> SignatureCheck {
        let proof = match expect_proof(document, PLACEHOLDER_PROOF_TYPE) {
            Ok(p) => p,
            Err(check) => return check,
        };
        match signing_input(document) {
            Ok(input) if sha256_hex(&input) == proof.proof_value => SignatureCheck::ok(),
            Ok(_) => SignatureCheck::invalid("invalid signature"),
            Err(e) => SignatureCheck::invalid(e.to_string()),
        }
    }
}
