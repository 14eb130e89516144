//! Attachment metadata persistence.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use agricert_core::{ActorId, AttachmentId, BatchId, Timestamp};
use agricert_state::AttachmentRecord;

use super::{collect_rows, ts};

pub async fn insert(conn: &mut PgConnection, a: &AttachmentRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO attachments (id, batch_id, file_name, storage_key, file_size, mime_type,
         uploaded_by, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(a.id.get())
    .bind(a.batch_id.get())
    .bind(&a.file_name)
    .bind(&a.storage_key)
    .bind(a.file_size)
    .bind(&a.mime_type)
    .bind(a.uploaded_by.get())
    .bind(ts(a.created_at))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete_for_batch(conn: &mut PgConnection, batch: BatchId) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM attachments WHERE batch_id = $1")
        .bind(batch.get())
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<AttachmentRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AttachmentRow>(
        "SELECT id, batch_id, file_name, storage_key, file_size, mime_type, uploaded_by,
         created_at FROM attachments ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(collect_rows(rows, "attachments", |r| Some(r.into_record())))
}

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: i64,
    batch_id: i64,
    file_name: String,
    storage_key: String,
    file_size: Option<i64>,
    mime_type: Option<String>,
    uploaded_by: i64,
    created_at: DateTime<Utc>,
}

impl AttachmentRow {
    fn into_record(self) -> AttachmentRecord {
        AttachmentRecord {
            id: AttachmentId(self.id),
            batch_id: BatchId(self.batch_id),
            file_name: self.file_name,
            storage_key: self.storage_key,
            file_size: self.file_size,
            mime_type: self.mime_type,
            uploaded_by: ActorId(self.uploaded_by),
            created_at: Timestamp::from_utc(self.created_at),
        }
    }
}
