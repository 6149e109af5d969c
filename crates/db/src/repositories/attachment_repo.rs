//! Repository for the fan-out attachment table.
//!
//! The table name is configurable, so every query interpolates it. Callers
//! must pass a name that already passed `FanoutOptions::validate`.

use std::time::Duration;

use pgsocket_core::types::DbId;
use sqlx::PgPool;

/// Stores payloads too large to travel inside a `NOTIFY`.
pub struct AttachmentRepo;

impl AttachmentRepo {
    /// Insert a payload, returning the generated ID.
    pub async fn insert(pool: &PgPool, table: &str, payload: &[u8]) -> Result<DbId, sqlx::Error> {
        let query = format!("INSERT INTO {table} (payload) VALUES ($1) RETURNING id");
        sqlx::query_scalar(&query)
            .bind(payload)
            .fetch_one(pool)
            .await
    }

    /// Fetch a payload by ID. Returns `None` once cleanup removed it.
    pub async fn find_payload(
        pool: &PgPool,
        table: &str,
        id: DbId,
    ) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let query = format!("SELECT payload FROM {table} WHERE id = $1");
        sqlx::query_scalar(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delete attachments created more than `max_age` ago.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_older_than(
        pool: &PgPool,
        table: &str,
        max_age: Duration,
    ) -> Result<u64, sqlx::Error> {
        let query = format!(
            "DELETE FROM {table} WHERE created_at < now() - make_interval(secs => $1)"
        );
        let result = sqlx::query(&query)
            .bind(max_age.as_secs_f64())
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
