//! # agricert-vc: Quality Certificate Credentials
//!
//! Everything about the credential *document*, independent of where
//! batches and inspections are stored:
//!
//! - [`credential`]: the W3C-style document envelope and claim readers.
//! - [`proof`]: the proof block and the signing input rule.
//! - [`template`]: fixed context/type boilerplate and quality policy,
//!   parsed once at startup from YAML.
//! - [`document`]: canonical document construction from batch,
//!   inspection and party claims.
//! - [`validate`]: the structural required-field contract.
//! - [`signer`]: the pluggable signing capability (Ed25519 and a
//!   hash-based placeholder).
//! - [`qr`]: the pluggable QR encoding capability and integrity checksum.
//!
//! Structural validation and signature verification are separate steps:
//! a document can be well-formed and carry a bad signature, or be signed
//! correctly and still miss required fields.

pub mod credential;
pub mod did;
pub mod document;
pub mod error;
pub mod proof;
pub mod qr;
pub mod signer;
pub mod template;
pub mod validate;

pub use credential::{
    document_batch_id, document_expiration, document_id, document_proof_value, Issuer,
    VerifiableCredential,
};
pub use document::{
    build_document, AttachmentClaim, BatchClaims, InspectionClaims, IssuanceInput, PartyClaims,
};
pub use error::VcError;
pub use proof::{signing_input, Proof, ProofPurpose};
pub use qr::{document_checksum, verify_checksum, QrArtifact, QrEncoder, QrMode, SvgQrEncoder};
pub use signer::{
    verify_ed25519_document, Ed25519Signer, PlaceholderSigner, SignatureCheck, SignedDocument,
    Signer,
};
pub use template::{CredentialTemplate, QrOptions};
pub use validate::validate_structure;
