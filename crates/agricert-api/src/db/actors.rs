//! Actor profile persistence.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use agricert_core::{ActorId, Timestamp};
use agricert_state::{ActorProfile, Role};

use super::{collect_rows, ts};

pub async fn insert(conn: &mut PgConnection, actor: &ActorProfile) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO actors (id, role, name, email, organization, registration_number,
         license_number, address, country, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(actor.id.get())
    .bind(actor.role.as_str())
    .bind(&actor.name)
    .bind(&actor.email)
    .bind(&actor.organization)
    .bind(&actor.registration_number)
    .bind(&actor.license_number)
    .bind(&actor.address)
    .bind(&actor.country)
    .bind(ts(actor.created_at))
    .bind(ts(actor.updated_at))
    .execute(conn)
    .await?;
    Ok(())
}

/// Overwrite profile fields. The role column is never updated.
pub async fn update(conn: &mut PgConnection, actor: &ActorProfile) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE actors SET name = $1, email = $2, organization = $3, registration_number = $4,
         license_number = $5, address = $6, country = $7, updated_at = $8 WHERE id = $9",
    )
    .bind(&actor.name)
    .bind(&actor.email)
    .bind(&actor.organization)
    .bind(&actor.registration_number)
    .bind(&actor.license_number)
    .bind(&actor.address)
    .bind(&actor.country)
    .bind(ts(actor.updated_at))
    .bind(actor.id.get())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<ActorProfile>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ActorRow>(
        "SELECT id, role, name, email, organization, registration_number, license_number,
         address, country, created_at, updated_at FROM actors ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(collect_rows(rows, "actors", ActorRow::into_record))
}

#[derive(sqlx::FromRow)]
struct ActorRow {
    id: i64,
    role: String,
    name: String,
    email: Option<String>,
    organization: Option<String>,
    registration_number: Option<String>,
    license_number: Option<String>,
    address: Option<String>,
    country: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ActorRow {
    fn into_record(self) -> Option<ActorProfile> {
        let role: Role = match self.role.parse() {
            Ok(r) => r,
            Err(_) => {
                tracing::warn!(id = self.id, role = %self.role, "unknown actor role in database");
                return None;
            }
        };
        Some(ActorProfile {
            id: ActorId(self.id),
            role,
            name: self.name,
            email: self.email,
            organization: self.organization,
            registration_number: self.registration_number,
            license_number: self.license_number,
            address: self.address,
            country: self.country,
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
        })
    }
}
