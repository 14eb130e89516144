//! # Verification audit trail
//!
//! One append-only entry per verification attempt, whatever the outcome.
//! Entries are never mutated; they exist for statistics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agricert_core::{Timestamp, VerificationLogId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Valid,
    Invalid,
    Revoked,
    Expired,
}

impl VerificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-declared context of whoever is verifying. Not authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierContext {
    pub role: Option<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationLogEntry {
    pub id: VerificationLogId,
    /// Matched credential id, else the document's own id, else `unknown`.
    pub credential_id: String,
    pub verifier: VerifierContext,
    pub outcome: VerificationOutcome,
    pub method: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub verified_at: Timestamp,
}

/// What a verifier gets back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub valid: bool,
    pub outcome: VerificationOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuance_date: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_subject: Option<Value>,
}

impl VerificationReport {
    pub fn rejected(outcome: VerificationOutcome, errors: Vec<String>) -> Self {
        Self {
            valid: false,
            outcome,
            errors,
            credential_id: None,
            issuer: None,
            issuance_date: None,
            expiration_date: None,
            credential_subject: None,
        }
    }

    /// Accepted: echoes issuer, dates and subject claims of `document`.
    pub fn accepted(document: &Value) -> Self {
        let pick = |k: &str| document.get(k).cloned();
        Self {
            valid: true,
            outcome: VerificationOutcome::Valid,
            errors: Vec::new(),
            credential_id: None,
            issuer: pick("issuer"),
            issuance_date: pick("issuanceDate"),
            expiration_date: pick("expirationDate"),
            credential_subject: pick("credentialSubject"),
        }
    }

    pub fn with_credential_id(mut self, id: Option<String>) -> Self {
        self.credential_id = id;
        self
    }
}

/// Per-credential verification statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStats {
    pub total_verifications: u64,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub revoked_count: u64,
    pub expired_count: u64,
    pub last_verified: Option<Timestamp>,
}

impl VerificationStats {
    pub fn tally<'a>(entries: impl IntoIterator<Item = &'a VerificationLogEntry>) -> Self {
        entries.into_iter().fold(Self::default(), |mut s, e| {
            s.record(e);
            s
        })
    }

    /// Count one more attempt.
    pub fn record(&mut self, entry: &VerificationLogEntry) {
        self.total_verifications += 1;
        match entry.outcome {
            VerificationOutcome::Valid => self.valid_count += 1,
            VerificationOutcome::Invalid => self.invalid_count += 1,
            VerificationOutcome::Revoked => self.revoked_count += 1,
            VerificationOutcome::Expired => self.expired_count += 1,
        }
        self.last_verified = self.last_verified.max(Some(entry.verified_at));
    }
}
