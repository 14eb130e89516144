//! Inspection persistence. Findings are stored as one JSONB column.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use agricert_core::{ActorId, BatchId, InspectionId, Timestamp};
use agricert_state::{InspectionFindings, InspectionRecord, InspectionResult};

use super::{collect_rows, opt_ts, ts};

pub async fn insert(conn: &mut PgConnection, insp: &InspectionRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO inspections (id, batch_id, qa_agency_id, inspection_date, findings, result,
         result_submitted_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(insp.id.get())
    .bind(insp.batch_id.get())
    .bind(insp.qa_agency_id.get())
    .bind(ts(insp.inspection_date))
    .bind(Json(&insp.findings))
    .bind(insp.result.map(|r| r.as_str()))
    .bind(opt_ts(insp.result_submitted_at))
    .bind(ts(insp.created_at))
    .bind(ts(insp.updated_at))
    .execute(conn)
    .await?;
    Ok(())
}

/// Overwrite findings and result while no result has been stored.
pub async fn update_open(
    conn: &mut PgConnection,
    insp: &InspectionRecord,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE inspections SET findings = $1, result = $2, result_submitted_at = $3,
         updated_at = $4 WHERE id = $5 AND result IS NULL",
    )
    .bind(Json(&insp.findings))
    .bind(insp.result.map(|r| r.as_str()))
    .bind(opt_ts(insp.result_submitted_at))
    .bind(ts(insp.updated_at))
    .bind(insp.id.get())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<InspectionRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, InspectionRow>(
        "SELECT id, batch_id, qa_agency_id, inspection_date, findings, result,
         result_submitted_at, created_at, updated_at FROM inspections ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(collect_rows(rows, "inspections", InspectionRow::into_record))
}

#[derive(sqlx::FromRow)]
struct InspectionRow {
    id: i64,
    batch_id: i64,
    qa_agency_id: i64,
    inspection_date: DateTime<Utc>,
    findings: Json<InspectionFindings>,
    result: Option<String>,
    result_submitted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InspectionRow {
    fn into_record(self) -> Option<InspectionRecord> {
        let result = match self.result.as_deref().map(str::parse::<InspectionResult>) {
            None => None,
            Some(Ok(r)) => Some(r),
            Some(Err(_)) => {
                tracing::warn!(id = self.id, "unknown inspection result in database");
                return None;
            }
        };
        Some(InspectionRecord {
            id: InspectionId(self.id),
            batch_id: BatchId(self.batch_id),
            qa_agency_id: ActorId(self.qa_agency_id),
            inspection_date: Timestamp::from_utc(self.inspection_date),
            findings: self.findings.0,
            result,
            result_submitted_at: self.result_submitted_at.map(Timestamp::from_utc),
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
        })
    }
}
