//! # agricert-state: Entity Records and Lifecycle State Machines
//!
//! Pure, storage-agnostic records for every entity of the certification
//! lifecycle. Each transition is a method that checks the current state,
//! mutates the record, and leaves it untouched on error. Persistence,
//! authorization of the caller's role, and atomic multi-record writes live
//! in the API layer's ledger.
//!
//! ## State Machines
//!
//! - **Batch** (`batch.rs`): `Submitted → UnderInspection → Certified |
//!   Rejected`, plus `Certified ⇄ Revoked` through revocation and
//!   re-issuance, and a soft `Deleted` branch from `Submitted`.
//!
//! - **Inspection** (`inspection.rs`): one per batch, editable until a
//!   write-once result is submitted.
//!
//! - **Credential** (`credential.rs`): `Active → Revoked`, one-way. The
//!   signed document never changes after issuance.
//!
//! ## Supporting Records
//!
//! - **Actor** (`actor.rs`): exporter / QA agency / admin profiles.
//! - **Attachment** (`attachment.rs`): document metadata per batch.
//! - **Verification** (`verification.rs`): append-only verification log
//!   and the report handed back to verifiers.

pub mod actor;
pub mod attachment;
pub mod batch;
pub mod credential;
pub mod inspection;
pub mod verification;

// ─── Actor re-exports ───────────────────────────────────────────────

pub use actor::{ActorPatch, ActorProfile, NewActor, Role};

// ─── Batch re-exports ───────────────────────────────────────────────

pub use batch::{BatchError, BatchPatch, BatchRecord, BatchStatus, BatchTransitionRecord, NewBatch};

// ─── Inspection re-exports ──────────────────────────────────────────

pub use inspection::{
    InspectionError, InspectionFindings, InspectionPatch, InspectionProgress, InspectionRecord,
    InspectionResult,
};

// ─── Credential re-exports ──────────────────────────────────────────

pub use credential::{
    CredentialError, CredentialRecord, CredentialStatistics, CredentialStatus, NewCredential,
    RevocationStatus,
};

// ─── Attachment / verification re-exports ───────────────────────────

pub use attachment::{AttachmentRecord, NewAttachment, MAX_ATTACHMENT_BYTES};
pub use verification::{
    VerificationLogEntry, VerificationOutcome, VerificationReport, VerificationStats,
    VerifierContext,
};
