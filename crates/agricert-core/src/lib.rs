//! # agricert-core: Foundational Types for Export Certification
//!
//! The leaf crate of the workspace. Every other `agricert-*` crate depends
//! on it; it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `BatchId`, `InspectionId`,
//!    `CredentialKey`, `ActorId` and `AttachmentId` are distinct types, so a
//!    batch id can never be passed where an inspection id is expected.
//!    `BatchNumber` and `CredentialId` are the externally visible, textual
//!    identifiers with validated constructors.
//!
//! 2. **`CanonicalBytes` newtype.** Every digest and every signature input
//!    flows through `CanonicalBytes::new()` (RFC 8785 JCS). Nothing hashes
//!    raw `serde_json::to_vec()` output.
//!
//! 3. **One error taxonomy.** [`AgriError`] has exactly the lifecycle error
//!    classes callers must distinguish: validation, not found, access denied,
//!    invalid state, conflict, external service.
//!
//! 4. **UTC-only timestamps.** [`Timestamp`] is UTC with `Z` suffix and
//!    seconds precision, matching the canonical form used in credentials.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `agricert-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use error::{AgriError, CanonicalizationError};
pub use identity::{
    ActorId, AttachmentId, BatchId, BatchNumber, CredentialId, CredentialKey, InspectionId,
    VerificationLogId,
};
pub use temporal::Timestamp;
