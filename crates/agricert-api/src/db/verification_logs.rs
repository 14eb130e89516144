//! Verification log persistence. Append-only: there is no update or
//! delete function. History is queried here, never hydrated into memory.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use agricert_core::{Timestamp, VerificationLogId};
use agricert_state::{
    VerificationLogEntry, VerificationOutcome, VerificationStats, VerifierContext,
};

use super::{collect_rows, ts};

pub async fn insert(conn: &mut PgConnection, e: &VerificationLogEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO verification_logs (id, credential_id, verifier, outcome, method,
         ip_address, user_agent, verified_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(e.id.get())
    .bind(&e.credential_id)
    .bind(Json(&e.verifier))
    .bind(e.outcome.as_str())
    .bind(&e.method)
    .bind(&e.ip_address)
    .bind(&e.user_agent)
    .bind(ts(e.verified_at))
    .execute(conn)
    .await?;
    Ok(())
}

/// Highest id in the table, 0 when empty. Seeds the id sequence.
pub async fn max_id(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM verification_logs")
        .fetch_one(pool)
        .await?;
    Ok(max.unwrap_or(0))
}

/// Outcome counts and latest attempt for one credential.
pub async fn stats(pool: &PgPool, credential_id: &str) -> Result<VerificationStats, sqlx::Error> {
    let row = sqlx::query_as::<_, StatsRow>(
        "SELECT COUNT(*) AS total,
         COUNT(*) FILTER (WHERE outcome = 'valid') AS valid,
         COUNT(*) FILTER (WHERE outcome = 'invalid') AS invalid,
         COUNT(*) FILTER (WHERE outcome = 'revoked') AS revoked,
         COUNT(*) FILTER (WHERE outcome = 'expired') AS expired,
         MAX(verified_at) AS last_verified
         FROM verification_logs WHERE credential_id = $1",
    )
    .bind(credential_id)
    .fetch_one(pool)
    .await?;
    Ok(row.into_stats())
}

/// The `limit` most recent entries for one credential, newest first.
pub async fn recent(
    pool: &PgPool,
    credential_id: &str,
    limit: usize,
) -> Result<Vec<VerificationLogEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, VerificationRow>(
        "SELECT id, credential_id, verifier, outcome, method, ip_address, user_agent,
         verified_at FROM verification_logs WHERE credential_id = $1
         ORDER BY verified_at DESC, id DESC LIMIT $2",
    )
    .bind(credential_id)
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;
    Ok(collect_rows(rows, "verification_logs", VerificationRow::into_record))
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total: i64,
    valid: i64,
    invalid: i64,
    revoked: i64,
    expired: i64,
    last_verified: Option<DateTime<Utc>>,
}

impl StatsRow {
    fn into_stats(self) -> VerificationStats {
        let count = |n: i64| u64::try_from(n).unwrap_or(0);
        VerificationStats {
            total_verifications: count(self.total),
            valid_count: count(self.valid),
            invalid_count: count(self.invalid),
            revoked_count: count(self.revoked),
            expired_count: count(self.expired),
            last_verified: self.last_verified.map(Timestamp::from_utc),
        }
    }
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    id: i64,
    credential_id: String,
    verifier: Json<VerifierContext>,
    outcome: String,
    method: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    verified_at: DateTime<Utc>,
}

fn parse_outcome(s: &str) -> Option<VerificationOutcome> {
    match s {
        "valid" => Some(VerificationOutcome::Valid),
        "invalid" => Some(VerificationOutcome::Invalid),
        "revoked" => Some(VerificationOutcome::Revoked),
        "expired" => Some(VerificationOutcome::Expired),
        _ => None,
    }
}

impl VerificationRow {
    fn into_record(self) -> Option<VerificationLogEntry> {
        let Some(outcome) = parse_outcome(&self.outcome) else {
            tracing::warn!(id = self.id, outcome = %self.outcome, "unknown verification outcome");
            return None;
        };
        Some(VerificationLogEntry {
            id: VerificationLogId(self.id),
            credential_id: self.credential_id,
            verifier: self.verifier.0,
            outcome,
            method: self.method,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            verified_at: Timestamp::from_utc(self.verified_at),
        })
    }
}
