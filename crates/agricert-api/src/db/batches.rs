//! Batch persistence. Status updates are conditional on the status the
//! transition was decided from.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use agricert_core::{ActorId, BatchId, BatchNumber, Timestamp};
use agricert_state::{BatchRecord, BatchStatus, BatchTransitionRecord};

use super::{collect_rows, ts};

pub async fn insert(conn: &mut PgConnection, batch: &BatchRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO batches (id, batch_number, exporter_id, product_type, product_name, quantity,
         unit, origin_location, destination_country, packaging_type, storage_conditions,
         assigned_qa_id, status, transitions, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
    )
    .bind(batch.id.get())
    .bind(batch.batch_number.as_str())
    .bind(batch.exporter_id.get())
    .bind(&batch.product_type)
    .bind(&batch.product_name)
    .bind(batch.quantity)
    .bind(&batch.unit)
    .bind(&batch.origin_location)
    .bind(&batch.destination_country)
    .bind(&batch.packaging_type)
    .bind(&batch.storage_conditions)
    .bind(batch.assigned_qa_id.map(ActorId::get))
    .bind(batch.status.as_str())
    .bind(Json(&batch.transitions))
    .bind(ts(batch.created_at))
    .bind(ts(batch.updated_at))
    .execute(conn)
    .await?;
    Ok(())
}

/// Replace the mutable columns if the stored status is still `expect`.
pub async fn update(
    conn: &mut PgConnection,
    batch: &BatchRecord,
    expect: BatchStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE batches SET quantity = $1, unit = $2, destination_country = $3,
         packaging_type = $4, storage_conditions = $5, assigned_qa_id = $6, status = $7,
         transitions = $8, updated_at = $9
         WHERE id = $10 AND status = $11",
    )
    .bind(batch.quantity)
    .bind(&batch.unit)
    .bind(&batch.destination_country)
    .bind(&batch.packaging_type)
    .bind(&batch.storage_conditions)
    .bind(batch.assigned_qa_id.map(ActorId::get))
    .bind(batch.status.as_str())
    .bind(Json(&batch.transitions))
    .bind(ts(batch.updated_at))
    .bind(batch.id.get())
    .bind(expect.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<BatchRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BatchRow>(
        "SELECT id, batch_number, exporter_id, product_type, product_name, quantity, unit,
         origin_location, destination_country, packaging_type, storage_conditions,
         assigned_qa_id, status, transitions, created_at, updated_at
         FROM batches ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(collect_rows(rows, "batches", BatchRow::into_record))
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: i64,
    batch_number: String,
    exporter_id: i64,
    product_type: String,
    product_name: String,
    quantity: f64,
    unit: String,
    origin_location: String,
    destination_country: String,
    packaging_type: Option<String>,
    storage_conditions: Option<String>,
    assigned_qa_id: Option<i64>,
    status: String,
    transitions: Json<Vec<BatchTransitionRecord>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BatchRow {
    fn into_record(self) -> Option<BatchRecord> {
        let status: BatchStatus = match self.status.parse() {
            Ok(s) => s,
            Err(_) => {
                tracing::warn!(id = self.id, status = %self.status, "unknown batch status in database");
                return None;
            }
        };
        let batch_number = match BatchNumber::parse(&self.batch_number) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(id = self.id, error = %e, "malformed batch number in database");
                return None;
            }
        };
        Some(BatchRecord {
            id: BatchId(self.id),
            batch_number,
            exporter_id: ActorId(self.exporter_id),
            product_type: self.product_type,
            product_name: self.product_name,
            quantity: self.quantity,
            unit: self.unit,
            origin_location: self.origin_location,
            destination_country: self.destination_country,
            packaging_type: self.packaging_type,
            storage_conditions: self.storage_conditions,
            assigned_qa_id: self.assigned_qa_id.map(ActorId),
            status,
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
            transitions: self.transitions.0,
        })
    }
}
