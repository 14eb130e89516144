//! # Database Persistence Layer
//!
//! Postgres persistence for the ledger via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, every
//! committed unit of work is written through to PostgreSQL inside one
//! transaction, and the in-memory tables are hydrated from it on startup.
//! When absent, the API runs memory-only (development and tests).
//!
//! Write functions take a `&mut PgConnection` so they can run inside the
//! unit-of-work transaction. Conditional updates return `false` when their
//! guard matched no row; `load_all` and query functions take the pool.

pub mod actors;
pub mod attachments;
pub mod batches;
pub mod credentials;
pub mod inspections;
pub mod verification_logs;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use agricert_core::Timestamp;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no URL is configured (memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let url = match url {
        Some(url) => url,
        None => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

pub(crate) fn ts(t: Timestamp) -> DateTime<Utc> {
    *t.as_datetime()
}

pub(crate) fn opt_ts(t: Option<Timestamp>) -> Option<DateTime<Utc>> {
    t.map(ts)
}

/// Collect decoded rows, logging and skipping the ones that fail.
pub(crate) fn collect_rows<R, T>(
    rows: Vec<R>,
    table: &'static str,
    decode: impl Fn(R) -> Option<T>,
) -> Vec<T> {
    let total = rows.len();
    let records: Vec<T> = rows.into_iter().filter_map(decode).collect();
    if records.len() != total {
        tracing::error!(
            table,
            skipped = total - records.len(),
            "skipping undecodable rows"
        );
    }
    records
}
