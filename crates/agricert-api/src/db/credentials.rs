//! Credential persistence.
//!
//! The partial unique index `credentials_one_active_per_inspection` makes
//! a second non-revoked credential for the same inspection fail at insert
//! time with a unique violation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use agricert_core::{ActorId, BatchId, CredentialId, CredentialKey, InspectionId, Timestamp};
use agricert_state::CredentialRecord;
use agricert_vc::QrArtifact;

use super::{collect_rows, opt_ts, ts};

pub async fn insert(conn: &mut PgConnection, c: &CredentialRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO credentials (id, credential_id, batch_id, inspection_id, credential_type,
         document, signature, qr, issued_by, issued_at, expires_at, is_active, is_revoked,
         revoked_at, revoked_by, revocation_reason, verification_count, last_verified_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
    )
    .bind(c.key.get())
    .bind(c.credential_id.as_str())
    .bind(c.batch_id.get())
    .bind(c.inspection_id.get())
    .bind(&c.credential_type)
    .bind(&c.document)
    .bind(&c.signature)
    .bind(Json(&c.qr))
    .bind(c.issued_by.get())
    .bind(ts(c.issued_at))
    .bind(ts(c.expires_at))
    .bind(c.is_active)
    .bind(c.is_revoked)
    .bind(opt_ts(c.revoked_at))
    .bind(c.revoked_by.map(ActorId::get))
    .bind(&c.revocation_reason)
    .bind(c.verification_count)
    .bind(opt_ts(c.last_verified_at))
    .execute(conn)
    .await?;
    Ok(())
}

/// Store the revocation fields if the row is not yet revoked.
pub async fn revoke(conn: &mut PgConnection, c: &CredentialRecord) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE credentials SET is_revoked = TRUE, is_active = FALSE, revoked_at = $1,
         revoked_by = $2, revocation_reason = $3 WHERE id = $4 AND NOT is_revoked",
    )
    .bind(opt_ts(c.revoked_at))
    .bind(c.revoked_by.map(ActorId::get))
    .bind(&c.revocation_reason)
    .bind(c.key.get())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn replace_qr(
    conn: &mut PgConnection,
    key: CredentialKey,
    qr: &QrArtifact,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE credentials SET qr = $1 WHERE id = $2")
        .bind(Json(qr))
        .bind(key.get())
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Increment in place so concurrent verifications never lose a count.
pub async fn record_verification(
    conn: &mut PgConnection,
    key: CredentialKey,
    at: Timestamp,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE credentials SET verification_count = verification_count + 1,
         last_verified_at = $1 WHERE id = $2",
    )
    .bind(ts(at))
    .bind(key.get())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<CredentialRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CredentialRow>(
        "SELECT id, credential_id, batch_id, inspection_id, credential_type, document, signature,
         qr, issued_by, issued_at, expires_at, is_active, is_revoked, revoked_at, revoked_by,
         revocation_reason, verification_count, last_verified_at
         FROM credentials ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(collect_rows(rows, "credentials", CredentialRow::into_record))
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    credential_id: String,
    batch_id: i64,
    inspection_id: i64,
    credential_type: String,
    document: Value,
    signature: String,
    qr: Json<QrArtifact>,
    issued_by: i64,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_active: bool,
    is_revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<i64>,
    revocation_reason: Option<String>,
    verification_count: i64,
    last_verified_at: Option<DateTime<Utc>>,
}

impl CredentialRow {
    fn into_record(self) -> Option<CredentialRecord> {
        let credential_id = match CredentialId::parse(&self.credential_id) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(id = self.id, error = %e, "malformed credential id in database");
                return None;
            }
        };
        Some(CredentialRecord {
            key: CredentialKey(self.id),
            credential_id,
            batch_id: BatchId(self.batch_id),
            inspection_id: InspectionId(self.inspection_id),
            credential_type: self.credential_type,
            document: self.document,
            signature: self.signature,
            qr: self.qr.0,
            issued_by: ActorId(self.issued_by),
            issued_at: Timestamp::from_utc(self.issued_at),
            expires_at: Timestamp::from_utc(self.expires_at),
            is_active: self.is_active,
            is_revoked: self.is_revoked,
            revoked_at: self.revoked_at.map(Timestamp::from_utc),
            revoked_by: self.revoked_by.map(ActorId),
            revocation_reason: self.revocation_reason,
            verification_count: self.verification_count,
            last_verified_at: self.last_verified_at.map(Timestamp::from_utc),
        })
    }
}
