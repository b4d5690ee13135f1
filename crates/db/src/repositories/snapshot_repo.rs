//! Repository for the `task_snapshots` table.
//!
//! One row per snapshot key; the payload is an opaque serialized blob.

use chrono::Utc;

use crate::DbPool;

/// Single-key blob access for persisted task snapshots.
pub struct SnapshotRepo;

impl SnapshotRepo {
    /// Fetch the payload stored under `key`, if any.
    pub async fn find(pool: &DbPool, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT payload FROM task_snapshots WHERE key = ?1")
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace the payload stored under `key`.
    pub async fn upsert(pool: &DbPool, key: &str, payload: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO task_snapshots (key, payload, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(payload)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Remove the row for `key`. Returns `true` if a row was deleted.
    pub async fn delete(pool: &DbPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_snapshots WHERE key = ?1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
