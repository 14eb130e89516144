//! Public credential verification.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! ```text
//! structure ─▶ signature ─▶ expiry ─▶ stored credential revoked? ─▶ valid
//! ```
//!
//! The document comes from the verifier and need not be byte-identical to
//! the stored one. It is matched to a stored credential through the
//! claimed batch number and the proof value. Every attempt is appended to
//! the verification log, whatever the outcome.

use agricert_core::{AgriError, Timestamp};
use agricert_state::{
    CredentialRecord, VerificationLogEntry, VerificationOutcome, VerificationReport,
    VerifierContext,
};
use agricert_vc::{
    document_batch_id, document_expiration, document_id, document_proof_value, validate_structure,
};
use serde_json::Value;

use crate::middleware::metrics::VERIFICATIONS;
use crate::store::Write;

use super::Lifecycle;

/// Where a verification request came from.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// `api` unless the client says otherwise (e.g. `qr_scan`).
    pub method: Option<String>,
}

impl Lifecycle {
    pub async fn verify_credential(
        &self,
        document: &Value,
        verifier: VerifierContext,
        provenance: Provenance,
    ) -> Result<VerificationReport, AgriError> {
        let now = Timestamp::now();
        let (report, matched) = self.check(document, now).await;

        let logged_id = matched
            .as_ref()
            .map(|c| c.credential_id.as_str().to_string())
            .or_else(|| document_id(document).map(|id| id.rsplit(':').next().unwrap_or(id).to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        let entry = VerificationLogEntry {
            id: self.ledger.next_verification_id(),
            credential_id: logged_id.clone(),
            verifier,
            outcome: report.outcome,
            method: provenance.method.unwrap_or_else(|| "api".to_string()),
            ip_address: provenance.ip_address,
            user_agent: provenance.user_agent,
            verified_at: now,
        };

        let mut uow = self.ledger.begin();
        uow.stage(Write::AppendVerification(entry));
        if let Some(credential) = &matched {
            uow.stage(Write::RecordVerification {
                key: credential.key,
                at: now,
            });
        }
        uow.commit().await?;

        metrics::counter!(VERIFICATIONS, "outcome" => report.outcome.as_str()).increment(1);
        tracing::info!(
            credential_id = %logged_id,
            outcome = %report.outcome,
            "credential verified"
        );
        Ok(report.with_credential_id(matched.map(|c| c.credential_id.as_str().to_string())))
    }

    /// Run the checks. Also returns the stored credential the document
    /// matched, if any.
    async fn check(
        &self,
        document: &Value,
        now: Timestamp,
    ) -> (VerificationReport, Option<CredentialRecord>) {
        if let Err(errors) = validate_structure(document) {
            return (VerificationReport::rejected(VerificationOutcome::Invalid, errors), None);
        }

        let matched = self.stored_match(document);
        let signature = self.signer.verify(document).await;
        if !signature.valid {
            let mut errors = vec!["Invalid signature".to_string()];
            errors.extend(signature.reason);
            return (
                VerificationReport::rejected(VerificationOutcome::Invalid, errors),
                matched,
            );
        }

        match document_expiration(document) {
            Some(expires) if expires < now => {
                return (
                    VerificationReport::rejected(
                        VerificationOutcome::Expired,
                        vec!["Credential expired".to_string()],
                    ),
                    matched,
                );
            }
            Some(_) => {}
            None => {
                return (
                    VerificationReport::rejected(
                        VerificationOutcome::Invalid,
                        vec!["Expiration date is missing or malformed".to_string()],
                    ),
                    matched,
                );
            }
        }

        if matched.as_ref().is_some_and(|c| c.is_revoked) {
            return (
                VerificationReport::rejected(
                    VerificationOutcome::Revoked,
                    vec!["Credential has been revoked".to_string()],
                ),
                matched,
            );
        }
        (VerificationReport::accepted(document), matched)
    }

    /// Stored credential of the claimed batch whose proof value matches.
    fn stored_match(&self, document: &Value) -> Option<CredentialRecord> {
        let proof = document_proof_value(document)?;
        let batch = self.ledger.batch_by_number(document_batch_id(document)?)?;
        self.ledger
            .credentials_where(|c| c.batch_id == batch.id)
            .into_iter()
            .find(|c| c.proof_value() == Some(proof))
    }
}
