//! # Domain Identity Newtypes
//!
//! Numeric row identifiers are distinct types per table, so an
//! `InspectionId` cannot be passed where a `BatchId` is expected. The two
//! externally visible identifiers, [`BatchNumber`] and [`CredentialId`],
//! have validated constructors and generators.

use chrono::{Datelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::AgriError;

macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Access the raw row number.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

numeric_id!(
    /// Row identifier of a batch.
    BatchId,
    "batch"
);
numeric_id!(
    /// Row identifier of an inspection.
    InspectionId,
    "inspection"
);
numeric_id!(
    /// System (row) identifier of a credential. Never shown to verifiers;
    /// see [`CredentialId`] for the external identifier.
    CredentialKey,
    "credential"
);
numeric_id!(
    /// Identifier of an actor (exporter, QA agency or admin).
    ActorId,
    "actor"
);
numeric_id!(
    /// Row identifier of a batch attachment.
    AttachmentId,
    "attachment"
);
numeric_id!(
    /// Sequence number of a verification log entry.
    VerificationLogId,
    "verification"
);

/// Human-readable, globally unique batch number:
/// `BATCH-<year>-<epochMillis>-<3digitRandom>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchNumber(String);

impl BatchNumber {
    /// Generate a fresh batch number from the current time.
    pub fn generate() -> Self {
        let now = Utc::now();
        let suffix: u16 = rand::thread_rng().gen_range(0..1000);
        Self(format!(
            "BATCH-{}-{}-{suffix:03}",
            now.year(),
            now.timestamp_millis()
        ))
    }

    /// Parse an existing batch number, checking its shape.
    pub fn parse(s: &str) -> Result<Self, AgriError> {
        let parts: Vec<&str> = s.split('-').collect();
        let well_formed = parts.len() == 4
            && parts[0] == "BATCH"
            && parts[1].len() == 4
            && parts[3].len() == 3
            && parts[1..].iter().all(|p| p.chars().all(|c| c.is_ascii_digit()))
            && !parts[2].is_empty();
        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(AgriError::invalid(format!("malformed batch number: {s:?}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Externally visible credential identifier: `VC-` followed by 128 random
/// bits as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(String);

impl CredentialId {
    const PREFIX: &'static str = "VC-";

    /// Generate a fresh, collision-resistant credential identifier.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(format!("{}{hex}", Self::PREFIX))
    }

    /// Parse an identifier received from a caller.
    pub fn parse(s: &str) -> Result<Self, AgriError> {
        let body = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| AgriError::invalid(format!("credential id must start with VC-: {s:?}")))?;
        if body.len() != 32 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AgriError::invalid(format!("malformed credential id: {s:?}")));
        }
        Ok(Self(s.to_ascii_lowercase().replacen("vc-", Self::PREFIX, 1)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
