//! # Temporal Types: UTC-Only Timestamps
//!
//! `Timestamp` is UTC, truncated to seconds, and renders as
//! `YYYY-MM-DDTHH:MM:SSZ`. Credential `issuanceDate` / `expirationDate`
//! and every record timestamp use it, so canonical byte sequences never
//! depend on the server's local offset or sub-second clock noise.

use chrono::{DateTime, Months, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgriError;

/// A UTC-only timestamp, truncated to seconds precision.
///
/// # Construction
///
/// - [`Timestamp::now()`]: current UTC time, truncated.
/// - [`Timestamp::from_utc()`]: from a `DateTime<Utc>`, truncating sub-seconds.
/// - [`Timestamp::parse()`]: strict: `Z` suffix only.
/// - [`Timestamp::parse_lenient()`]: any RFC 3339 offset, converted to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp from the current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse a timestamp from an RFC 3339 string with a `Z` suffix.
    ///
    /// # Errors
    ///
    /// Returns `AgriError::Validation` if the string is not RFC 3339 or uses
    /// an explicit offset (even `+00:00`).
    pub fn parse(s: &str) -> Result<Self, AgriError> {
        if !s.ends_with('Z') {
            return Err(AgriError::invalid(format!(
                "Timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        Self::parse_lenient(s)
    }

    /// Parse a timestamp from an RFC 3339 string, accepting any timezone
    /// offset and converting to UTC.
    ///
    /// Used when reading dates out of documents supplied by verifiers,
    /// which may have been produced by other tooling.
    pub fn parse_lenient(s: &str) -> Result<Self, AgriError> {
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            AgriError::invalid(format!("Invalid RFC 3339 timestamp {s:?}: {e}"))
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Create a timestamp from a Unix epoch timestamp (seconds).
    pub fn from_epoch_secs(secs: i64) -> Result<Self, AgriError> {
        let dt = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| AgriError::invalid(format!("Invalid Unix timestamp: {secs}")))?;
        Ok(Self(dt))
    }

    /// Add calendar months. Day-of-month overflow clamps to the last day
    /// (e.g. Feb 29 + 12 months = Feb 28).
    pub fn add_months(&self, months: u32) -> Result<Self, AgriError> {
        self.0
            .checked_add_months(Months::new(months))
            .map(Self)
            .ok_or_else(|| AgriError::Internal(format!("timestamp overflow adding {months} months")))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the Unix epoch timestamp in seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Render as ISO8601 with Z suffix (e.g., `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}

/// Truncate a `DateTime<Utc>` to seconds precision (discard nanoseconds).
fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}
