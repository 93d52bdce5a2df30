use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::memory::expiry_from_now;
use super::{RepositoryError, SessionStore};
use crate::DbPool;

/// Session cache backed by the `scene_session_cache` table. Expiry is checked
/// on read; stale rows are overwritten by the next write for the same key.
pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Removes rows that expired before `now`. Returns the number deleted.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM scene_session_cache WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl SessionStore for SqlSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query(
            "SELECT payload, expires_at FROM scene_session_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String =
            row.try_get("payload").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let expires_at_str: String =
            row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let expires_at = DateTime::parse_from_rfc3339(&expires_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok((expires_at > Utc::now()).then_some(payload))
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), RepositoryError> {
        let expires_at = expiry_from_now(ttl)?;
        sqlx::query(
            "INSERT INTO scene_session_cache (cache_key, payload, expires_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(payload)
        .bind(expires_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM scene_session_cache WHERE cache_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
