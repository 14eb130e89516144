//! # Credential Lifecycle
//!
//! ```text
//! issue ──▶ Active ──revoke──▶ Revoked (terminal, one-way)
//!             │ ▲
//!             └─┘ regenerate QR / record verification
//! ```
//!
//! A credential is only ever created by the issuance protocol. After that
//! the signed document is immutable: QR regeneration replaces the QR
//! artifact, verification bumps the counter, revocation sets the revoked
//! flags. Nothing un-revokes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use agricert_core::{
    ActorId, AgriError, BatchId, CredentialId, CredentialKey, InspectionId, Timestamp,
};
use agricert_vc::QrArtifact;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Credential already revoked")]
    AlreadyRevoked,

    #[error("Revocation reason is required")]
    MissingReason,
}

impl From<CredentialError> for AgriError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::MissingReason => AgriError::invalid(err.to_string()),
            CredentialError::AlreadyRevoked => AgriError::InvalidState(err.to_string()),
        }
    }
}

/// Derived status at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Revoked,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub key: CredentialKey,
    pub credential_id: CredentialId,
    pub batch_id: BatchId,
    pub inspection_id: InspectionId,
    pub credential_type: String,
    /// The signed document exactly as issued.
    pub document: Value,
    pub signature: String,
    pub qr: QrArtifact,
    pub issued_by: ActorId,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub is_active: bool,
    pub is_revoked: bool,
    pub revoked_at: Option<Timestamp>,
    pub revoked_by: Option<ActorId>,
    pub revocation_reason: Option<String>,
    /// Verification attempts whose document carried this credential's
    /// proof value, whatever their outcome. Accepted verifications are
    /// counted from the log (`VerificationStats::valid_count`).
    pub verification_count: i64,
    pub last_verified_at: Option<Timestamp>,
}

/// Everything issuance produces before the row exists.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub credential_id: CredentialId,
    pub batch_id: BatchId,
    pub inspection_id: InspectionId,
    pub credential_type: String,
    pub document: Value,
    pub signature: String,
    pub qr: QrArtifact,
    pub issued_by: ActorId,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Answer to "is this credential revoked?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationStatus {
    pub credential_id: CredentialId,
    pub is_revoked: bool,
    pub revoked_at: Option<Timestamp>,
    pub revocation_reason: Option<String>,
    pub checked_at: Timestamp,
}

impl CredentialRecord {
    pub fn issue(key: CredentialKey, new: NewCredential) -> Self {
        Self {
            key,
            credential_id: new.credential_id,
            batch_id: new.batch_id,
            inspection_id: new.inspection_id,
            credential_type: new.credential_type,
            document: new.document,
            signature: new.signature,
            qr: new.qr,
            issued_by: new.issued_by,
            issued_at: new.issued_at,
            expires_at: new.expires_at,
            is_active: true,
            is_revoked: false,
            revoked_at: None,
            revoked_by: None,
            revocation_reason: None,
            verification_count: 0,
            last_verified_at: None,
        }
    }

    /// Mark revoked. One-way; a second call fails without changes.
    pub fn revoke(&mut self, by: Option<ActorId>, reason: &str) -> Result<(), CredentialError> {
        if self.is_revoked {
            return Err(CredentialError::AlreadyRevoked);
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CredentialError::MissingReason);
        }
        self.is_revoked = true;
        self.is_active = false;
        self.revoked_at = Some(Timestamp::now());
        self.revoked_by = by;
        self.revocation_reason = Some(reason.to_string());
        Ok(())
    }

    /// Swap in a freshly rendered QR artifact. The document is untouched,
    /// and revoked credentials keep verifying as revoked through the new code.
    pub fn replace_qr(&mut self, qr: QrArtifact) {
        self.qr = qr;
    }

    /// Count one attempt, accepted or not.
    pub fn record_verification(&mut self, at: Timestamp) {
        self.verification_count += 1;
        self.last_verified_at = Some(at);
    }

    /// Proof value of the stored document, used to match verifier input.
    pub fn proof_value(&self) -> Option<&str> {
        agricert_vc::document_proof_value(&self.document)
    }

    pub fn is_expired_at(&self, at: Timestamp) -> bool {
        self.expires_at < at
    }

    pub fn status_at(&self, at: Timestamp) -> CredentialStatus {
        if self.is_revoked {
            CredentialStatus::Revoked
        } else if self.is_expired_at(at) {
            CredentialStatus::Expired
        } else {
            CredentialStatus::Active
        }
    }

    pub fn revocation_status(&self) -> RevocationStatus {
        RevocationStatus {
            credential_id: self.credential_id.clone(),
            is_revoked: self.is_revoked,
            revoked_at: self.revoked_at,
            revocation_reason: self.revocation_reason.clone(),
            checked_at: Timestamp::now(),
        }
    }
}

/// Aggregate counts over all credentials. `expired` counts past-expiry
/// credentials whether or not they are also revoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatistics {
    pub total: u64,
    pub active: u64,
    pub revoked: u64,
    pub expired: u64,
}

impl CredentialStatistics {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a CredentialRecord>, now: Timestamp) -> Self {
        records.into_iter().fold(Self::default(), |mut s, c| {
            s.total += 1;
            if c.is_active && !c.is_revoked {
                s.active += 1;
            }
            if c.is_revoked {
                s.revoked += 1;
            }
            if c.is_expired_at(now) {
                s.expired += 1;
            }
            s
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agricert_vc::QrMode;
    use serde_json::json;

    fn qr(payload: &str) -> QrArtifact {
        QrArtifact {
            image: "data:image/svg+xml;base64,AAAA".into(),
            media_type: "image/svg+xml".into(),
            payload: payload.into(),
            encoded: payload.into(),
            checksum: "00".repeat(32),
            url: "http://localhost:3000/api/credentials/1".into(),
            mode: QrMode::Reference,
            generated_at: Timestamp::now(),
        }
    }

    fn issued() -> CredentialRecord {
        let now = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        CredentialRecord::issue(
            CredentialKey(1),
            NewCredential {
                credential_id: CredentialId::generate(),
                batch_id: BatchId(1),
                inspection_id: InspectionId(2),
                credential_type: "AgriQualityCertificate".into(),
                document: json!({"proof": {"proofValue": "sig-1"}}),
                signature: "sig-1".into(),
                qr: qr("first"),
                issued_by: ActorId(20),
                issued_at: now,
                expires_at: now.add_months(12).unwrap(),
            },
        )
    }

    // ── Issue / revoke ───────────────────────────────────────────────

    #[test]
    fn issued_is_active() {
        let c = issued();
        assert!(c.is_active && !c.is_revoked);
        assert_eq!(c.verification_count, 0);
        assert_eq!(c.proof_value(), Some("sig-1"));
    }

    #[test]
    fn revoke_is_one_way() {
        let mut c = issued();
        c.revoke(Some(ActorId(1)), " re-inspection failed ").unwrap();
        assert!(c.is_revoked && !c.is_active);
        assert_eq!(c.revocation_reason.as_deref(), Some("re-inspection failed"));

        let snapshot = c.clone();
        assert_eq!(c.revoke(Some(ActorId(1)), "again").unwrap_err(), CredentialError::AlreadyRevoked);
        assert_eq!(c, snapshot);
    }

    #[test]
    fn revoke_requires_reason() {
        let mut c = issued();
        assert_eq!(c.revoke(Some(ActorId(1)), "  ").unwrap_err(), CredentialError::MissingReason);
        assert!(!c.is_revoked);
        assert!(matches!(AgriError::from(CredentialError::MissingReason), AgriError::Validation(_)));
    }

    // ── QR / verification ────────────────────────────────────────────

    #[test]
    fn replace_qr_keeps_document() {
        let mut c = issued();
        let doc = c.document.clone();
        c.replace_qr(qr("second"));
        assert_eq!(c.qr.payload, "second");
        assert_eq!(c.document, doc);
    }

    #[test]
    fn revoked_credential_still_gets_new_qr() {
        let mut c = issued();
        let doc = c.document.clone();
        c.revoke(Some(ActorId(1)), "x").unwrap();
        c.replace_qr(qr("third"));
        assert_eq!(c.qr.payload, "third");
        assert_eq!(c.document, doc);
        assert!(c.is_revoked);
    }

    #[test]
    fn verification_counter_monotonic() {
        let mut c = issued();
        let t = Timestamp::now();
        c.record_verification(t);
        c.record_verification(t);
        assert_eq!(c.verification_count, 2);
        assert_eq!(c.last_verified_at, Some(t));
    }

    #[test]
    fn status_over_time() {
        let mut c = issued();
        assert_eq!(c.status_at(Timestamp::parse("2026-06-01T00:00:00Z").unwrap()), CredentialStatus::Active);
        assert_eq!(c.status_at(Timestamp::parse("2027-06-01T00:00:00Z").unwrap()), CredentialStatus::Expired);
        c.revoke(Some(ActorId(1)), "x").unwrap();
        assert_eq!(c.status_at(Timestamp::parse("2026-06-01T00:00:00Z").unwrap()), CredentialStatus::Revoked);
    }

    #[test]
    fn statistics() {
        let a = issued();
        let mut b = issued();
        b.revoke(Some(ActorId(1)), "x").unwrap();
        let now = Timestamp::parse("2027-06-01T00:00:00Z").unwrap();
        let stats = CredentialStatistics::tally([&a, &b], now);
        assert_eq!(
            stats,
            CredentialStatistics {
                total: 2,
                active: 1,
                revoked: 1,
                expired: 2
            }
        );
    }

    #[test]
    fn revocation_status_view() {
        let mut c = issued();
        c.revoke(Some(ActorId(1)), "fraud").unwrap();
        let s = c.revocation_status();
        assert!(s.is_revoked);
        assert_eq!(s.revocation_reason.as_deref(), Some("fraud"));
    }
}
