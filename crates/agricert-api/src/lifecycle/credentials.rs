//! Credential issuance, revocation, QR regeneration and queries.
//!
//! Issuance builds and signs the document and renders the QR before
//! anything is staged, so a signer or encoder failure leaves no trace.
//! The credential insert and the batch flip then commit together; the
//! insert guard (one non-revoked credential per inspection) is what
//! settles concurrent issuance, not the early read.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::IntoParams;

use agricert_core::{
    ActorId, AgriError, BatchId, ContentDigest, CredentialId, CredentialKey, InspectionId, Timestamp,
};
use agricert_state::{
    CredentialError, CredentialRecord, CredentialStatistics, InspectionResult, NewCredential,
    RevocationStatus, Role, VerificationLogEntry, VerificationStats,
};
use agricert_vc::{build_document, document_expiration, validate_structure, IssuanceInput, QrArtifact};

use crate::auth::{require_role, CallerIdentity};
use crate::middleware::metrics::{CREDENTIALS_ISSUED, CREDENTIALS_REVOKED};
use crate::store::{StoreError, Write};

use super::Lifecycle;

const DEFAULT_CREDENTIAL_PAGE: u32 = 50;
const MAX_CREDENTIAL_PAGE: u32 = 200;
const DEFAULT_HISTORY: usize = 50;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CredentialQuery {
    pub revoked: Option<bool>,
    pub active: Option<bool>,
    pub exporter_id: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPage {
    pub credentials: Vec<CredentialRecord>,
    pub total: usize,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredential {
    pub credential: CredentialRecord,
    pub signed_document: Value,
    pub qr_code: QrArtifact,
    pub credential_url: String,
}

/// What an unauthenticated scanner gets from a credential URL: the signed
/// document as issued, to be checked against the QR checksum and then
/// presented for verification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCredentialDocument {
    pub credential_id: CredentialId,
    pub batch_id: BatchId,
    pub credential: Value,
    pub checksum: String,
    pub is_revoked: bool,
    pub issuance_date: Option<Value>,
    pub expiration_date: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationHistory {
    pub credential_id: CredentialId,
    pub statistics: VerificationStats,
    pub logs: Vec<VerificationLogEntry>,
}

impl Lifecycle {
    /// Issue a credential for a passed inspection.
    pub async fn issue_credential(
        &self,
        caller: &CallerIdentity,
        batch_id: BatchId,
        inspection_id: InspectionId,
    ) -> Result<IssuedCredential, AgriError> {
        require_role(caller, &[Role::QaAgency])?;
        let agency = caller.actor_id()?;

        let mut batch = self.load_batch(batch_id)?;
        let inspection = self
            .ledger
            .inspection(inspection_id)
            .ok_or_else(|| AgriError::NotFound("Inspection not found".into()))?;
        if inspection.batch_id != batch.id {
            return Err(AgriError::invalid("Inspection does not belong to this batch"));
        }
        if !inspection.is_performed_by(agency) {
            return Err(AgriError::AccessDenied(
                "Only the inspecting QA agency may issue this credential".into(),
            ));
        }
        if inspection.result != Some(InspectionResult::Passed) {
            return Err(AgriError::InvalidState(
                "Cannot issue credential for failed inspection".into(),
            ));
        }
        if self.ledger.active_credential_for_inspection(inspection_id).is_some() {
            return Err(AgriError::Conflict(
                "Credential already issued for this inspection".into(),
            ));
        }
        let prior_status = batch.status;
        batch.certify_on_issuance()?;

        let exporter = self.load_actor(batch.exporter_id, "Exporter profile")?;
        let qa_agency = self.load_actor(agency, "QA agency profile")?;
        let attachments = self
            .ledger
            .attachments_for_batch(batch_id)
            .iter()
            .map(|a| a.claim())
            .collect();

        let credential_id = CredentialId::generate();
        let issued_at = Timestamp::now();
        let document = build_document(
            &self.template,
            &IssuanceInput {
                credential_id: &credential_id,
                batch: &batch.claims(attachments),
                inspection: &inspection.claims(),
                exporter: &exporter.party_claims(),
                qa_agency: &qa_agency.party_claims(),
                issued_at,
            },
        )?;
        validate_structure(&document).map_err(|errors| {
            AgriError::Validation(
                errors
                    .into_iter()
                    .map(|e| format!("Invalid VC structure: {e}"))
                    .collect(),
            )
        })?;

        let signed = self.signer.sign(&document).await.map_err(|e| {
            tracing::error!(batch_id = %batch_id, error = %e, "credential signing failed");
            AgriError::from(e)
        })?;
        let credential_url = self.credential_url(batch_id);
        let qr = self.qr.encode(&credential_url, &signed.document)?;
        let expires_at = match document_expiration(&signed.document) {
            Some(at) => at,
            None => issued_at.add_months(self.template.validity_months)?,
        };

        let record = CredentialRecord::issue(
            self.ledger.next_credential_key(),
            NewCredential {
                credential_id,
                batch_id,
                inspection_id,
                credential_type: self.template.subject_type.clone(),
                document: signed.document.clone(),
                signature: signed.signature,
                qr: qr.clone(),
                issued_by: agency,
                issued_at,
                expires_at,
            },
        );

        let mut uow = self.ledger.begin();
        uow.stage(Write::InsertCredential(record.clone()));
        uow.stage(Write::UpdateBatch {
            record: batch,
            expect: prior_status,
        });
        match uow.commit().await {
            Ok(()) => {}
            Err(StoreError::Duplicate(reason)) => {
                tracing::warn!(inspection_id = %inspection_id, %reason, "duplicate issuance rejected");
                return Err(AgriError::Conflict(
                    "Credential already issued for this inspection".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!(CREDENTIALS_ISSUED).increment(1);
        tracing::info!(
            credential_id = %record.credential_id.as_str(),
            batch_id = %batch_id,
            inspection_id = %inspection_id,
            actor_id = %agency,
            "credential issued"
        );
        Ok(IssuedCredential {
            signed_document: signed.document,
            credential: record,
            qr_code: qr,
            credential_url,
        })
    }

    /// Revoke a credential and its batch in one commit. A QA agency may
    /// only revoke what it issued.
    pub async fn revoke_credential(
        &self,
        caller: &CallerIdentity,
        id: &str,
        reason: &str,
    ) -> Result<CredentialRecord, AgriError> {
        require_role(caller, &[Role::QaAgency, Role::Admin])?;
        let mut credential = self.resolve_credential(id)?;
        self.ensure_issuer_or_admin(caller, &credential)?;
        credential.revoke(caller.actor_id, reason)?;

        let mut batch = self.load_batch(credential.batch_id)?;
        let prior_status = batch.status;
        batch.revoke(reason.trim())?;

        let mut uow = self.ledger.begin();
        uow.stage(Write::RevokeCredential(credential.clone()));
        uow.stage(Write::UpdateBatch {
            record: batch,
            expect: prior_status,
        });
        match uow.commit().await {
            Ok(()) => {}
            Err(StoreError::GuardFailed(reason)) => {
                tracing::debug!(credential_id = %id, %reason, "revocation lost a race");
                return Err(CredentialError::AlreadyRevoked.into());
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!(CREDENTIALS_REVOKED).increment(1);
        tracing::info!(
            credential_id = %credential.credential_id.as_str(),
            batch_id = %credential.batch_id,
            "credential revoked"
        );
        Ok(credential)
    }

    /// Re-render the QR from the stored signed document. Never re-signs.
    pub async fn regenerate_qr(
        &self,
        caller: &CallerIdentity,
        id: &str,
    ) -> Result<QrArtifact, AgriError> {
        require_role(caller, &[Role::QaAgency, Role::Admin])?;
        let mut credential = self.resolve_credential(id)?;
        self.ensure_issuer_or_admin(caller, &credential)?;
        let url = self.credential_url(credential.batch_id);
        let qr = self.qr.encode(&url, &credential.document)?;
        credential.replace_qr(qr.clone());

        let mut uow = self.ledger.begin();
        uow.stage(Write::ReplaceQr {
            key: credential.key,
            qr: qr.clone(),
        });
        uow.commit().await?;
        tracing::info!(credential_id = %credential.credential_id.as_str(), "QR code regenerated");
        Ok(qr)
    }

    pub fn get_credential(&self, id: &str) -> Result<CredentialRecord, AgriError> {
        self.resolve_credential(id)
    }

    pub fn credential_qr(&self, id: &str) -> Result<QrArtifact, AgriError> {
        Ok(self.resolve_credential(id)?.qr)
    }

    pub fn revocation_status(&self, id: &str) -> Result<RevocationStatus, AgriError> {
        Ok(self.resolve_credential(id)?.revocation_status())
    }

    /// The signed document behind a batch's credential URL. With a
    /// checksum, the credential whose QR carries it (an older, revoked one
    /// included); otherwise the newest.
    pub fn public_document(
        &self,
        batch_id: BatchId,
        checksum: Option<&str>,
    ) -> Result<PublicCredentialDocument, AgriError> {
        let mut credentials = self.ledger.credentials_where(|c| c.batch_id == batch_id);
        credentials.sort_by_key(|c| Reverse((c.issued_at, c.key)));
        let found = match checksum.map(ContentDigest::from_hex) {
            None => credentials.into_iter().next(),
            Some(None) => return Err(AgriError::invalid("checksum must be 64 hex characters")),
            Some(Some(wanted)) => credentials
                .into_iter()
                .find(|c| ContentDigest::from_hex(&c.qr.checksum) == Some(wanted)),
        };
        let credential =
            found.ok_or_else(|| AgriError::NotFound("Credential not found".into()))?;
        Ok(PublicCredentialDocument {
            issuance_date: credential.document.get("issuanceDate").cloned(),
            expiration_date: credential.document.get("expirationDate").cloned(),
            credential_id: credential.credential_id,
            batch_id: credential.batch_id,
            checksum: credential.qr.checksum,
            is_revoked: credential.is_revoked,
            credential: credential.document,
        })
    }

    /// Every credential ever issued for a batch, newest first.
    pub fn credentials_for_batch(&self, batch_id: BatchId) -> Result<Vec<CredentialRecord>, AgriError> {
        self.load_batch(batch_id)?;
        let mut credentials = self.ledger.credentials_where(|c| c.batch_id == batch_id);
        credentials.sort_by_key(|c| Reverse((c.issued_at, c.key)));
        Ok(credentials)
    }

    /// Filtered listing. QA agencies see what they issued; admins see all.
    pub fn list_credentials(
        &self,
        caller: &CallerIdentity,
        query: &CredentialQuery,
    ) -> Result<CredentialPage, AgriError> {
        require_role(caller, &[Role::QaAgency, Role::Admin])?;
        let issuer: Option<ActorId> = match caller.role {
            Role::Admin => None,
            _ => Some(caller.actor_id()?),
        };
        let exporter = query.exporter_id.map(ActorId);
        let batches = self.ledger.batches_where(|b| exporter.map_or(true, |e| b.exporter_id == e));

        let mut credentials = self.ledger.credentials_where(|c| {
            issuer.map_or(true, |i| c.issued_by == i)
                && query.revoked.map_or(true, |r| c.is_revoked == r)
                && query.active.map_or(true, |a| c.is_active == a)
                && (exporter.is_none() || batches.iter().any(|b| b.id == c.batch_id))
        });
        credentials.sort_by_key(|c| Reverse((c.issued_at, c.key)));

        let limit = query
            .limit
            .unwrap_or(DEFAULT_CREDENTIAL_PAGE)
            .clamp(1, MAX_CREDENTIAL_PAGE);
        let offset = query.offset.unwrap_or(0);
        let total = credentials.len();
        let credentials = credentials
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(CredentialPage {
            credentials,
            total,
            limit,
            offset,
        })
    }

    pub fn credential_statistics(
        &self,
        caller: &CallerIdentity,
    ) -> Result<CredentialStatistics, AgriError> {
        require_role(caller, &[Role::Admin])?;
        let all = self.ledger.credentials_where(|_| true);
        Ok(CredentialStatistics::tally(&all, Timestamp::now()))
    }

    /// Verification statistics and the most recent log entries.
    pub async fn verification_history(
        &self,
        caller: &CallerIdentity,
        id: &str,
        limit: Option<usize>,
    ) -> Result<VerificationHistory, AgriError> {
        require_role(caller, &[Role::QaAgency, Role::Admin])?;
        let credential = self.resolve_credential(id)?;
        let (statistics, logs) = self
            .ledger
            .verification_history(
                credential.credential_id.as_str(),
                limit.unwrap_or(DEFAULT_HISTORY),
            )
            .await?;
        Ok(VerificationHistory {
            credential_id: credential.credential_id,
            statistics,
            logs,
        })
    }

    /// Accepts a row key (`12`) or an external id (`VC-...`).
    fn resolve_credential(&self, id: &str) -> Result<CredentialRecord, AgriError> {
        let id = id.trim();
        let found = if id.starts_with("VC-") {
            CredentialId::parse(id)
                .ok()
                .and_then(|id| self.ledger.credential_by_id(id.as_str()))
        } else {
            id.parse::<i64>()
                .ok()
                .and_then(|key| self.ledger.credential(CredentialKey(key)))
        };
        found.ok_or_else(|| AgriError::NotFound("Credential not found".into()))
    }

    fn ensure_issuer_or_admin(
        &self,
        caller: &CallerIdentity,
        credential: &CredentialRecord,
    ) -> Result<(), AgriError> {
        if caller.is_admin() || caller.actor_id()? == credential.issued_by {
            Ok(())
        } else {
            Err(AgriError::AccessDenied(
                "Only the issuing QA agency or an admin may manage this credential".into(),
            ))
        }
    }
}
