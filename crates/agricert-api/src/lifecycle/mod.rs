//! # Lifecycle Engine
//!
//! Orchestrates every state-changing operation of the certification
//! workflow. Each operation:
//!
//! 1. checks the caller's role and ownership against a fresh snapshot,
//! 2. runs the transition on an owned copy of the record(s),
//! 3. stages the resulting writes in one [`UnitOfWork`](crate::store::UnitOfWork)
//!    whose guards re-check the preconditions at commit time.
//!
//! Nothing is written when any step fails. Multi-record transitions
//! (result submission, issuance, revocation) land together or not at all.
//!
//! Operations are grouped by entity: [`actors`], [`batches`],
//! [`inspections`], [`credentials`] and [`verification`].

pub mod actors;
pub mod batches;
pub mod credentials;
pub mod inspections;
pub mod verification;

use std::sync::Arc;

use agricert_core::{ActorId, AgriError, BatchId};
use agricert_state::{ActorProfile, BatchRecord, Role};
use agricert_vc::{CredentialTemplate, QrEncoder, Signer};

use crate::attachments::AttachmentStorage;
use crate::auth::CallerIdentity;
use crate::store::Ledger;

pub use batches::{AttachmentView, BatchDetail, BatchPage, BatchQuery};
pub use credentials::{
    CredentialPage, CredentialQuery, IssuedCredential, PublicCredentialDocument, VerificationHistory,
};
pub use inspections::PendingInspection;
pub use verification::Provenance;

pub struct Lifecycle {
    ledger: Arc<Ledger>,
    signer: Arc<dyn Signer>,
    qr: Arc<dyn QrEncoder>,
    template: Arc<CredentialTemplate>,
    attachments: Arc<dyn AttachmentStorage>,
    base_url: String,
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("backend", &self.ledger.backend())
            .field("verification_method", &self.signer.verification_method())
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Lifecycle {
    pub fn new(
        ledger: Arc<Ledger>,
        signer: Arc<dyn Signer>,
        qr: Arc<dyn QrEncoder>,
        template: Arc<CredentialTemplate>,
        attachments: Arc<dyn AttachmentStorage>,
        base_url: &str,
    ) -> Self {
        Self {
            ledger,
            signer,
            qr,
            template,
            attachments,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn template(&self) -> &CredentialTemplate {
        &self.template
    }

    /// Stable public URL of a batch's signed document. QR regeneration
    /// rebuilds exactly this URL.
    pub fn credential_url(&self, batch: BatchId) -> String {
        format!("{}/api/credentials/batch/{}/document", self.base_url, batch.get())
    }

    fn load_batch(&self, id: BatchId) -> Result<BatchRecord, AgriError> {
        self.ledger
            .batch(id)
            .ok_or_else(|| AgriError::NotFound("Batch not found".into()))
    }

    fn load_actor(&self, id: ActorId, what: &str) -> Result<ActorProfile, AgriError> {
        self.ledger
            .actor(id)
            .ok_or_else(|| AgriError::NotFound(format!("{what} not found")))
    }

    /// Batch visibility: owner exporter, assigned QA agency, admin.
    fn ensure_can_view(&self, caller: &CallerIdentity, batch: &BatchRecord) -> Result<(), AgriError> {
        let allowed = match caller.role {
            Role::Admin => true,
            Role::Exporter => batch.is_owned_by(caller.actor_id()?),
            Role::QaAgency => batch.is_assigned_to(caller.actor_id()?),
        };
        if allowed {
            Ok(())
        } else {
            Err(AgriError::AccessDenied("Access denied".into()))
        }
    }

    /// Mutations reserved to the owner exporter or an admin.
    fn ensure_owner_or_admin(
        &self,
        caller: &CallerIdentity,
        batch: &BatchRecord,
    ) -> Result<(), AgriError> {
        match caller.role {
            Role::Admin => Ok(()),
            Role::Exporter if batch.is_owned_by(caller.actor_id()?) => Ok(()),
            _ => Err(AgriError::AccessDenied(
                "Only the owning exporter or an admin may modify this batch".into(),
            )),
        }
    }
}
