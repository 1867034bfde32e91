// SQLite ResultStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use parcel_core::domain::JobId;
use parcel_core::error::Result;
use parcel_core::port::{ResultStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteResultStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteResultStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn put(&self, id: &JobId, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO results (job_id, value, stored_at) VALUES (?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET value = excluded.value, stored_at = excluded.stored_at
            "#,
        )
        .bind(id)
        .bind(value)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM results WHERE job_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn purge_before(&self, cutoff_millis: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM results WHERE stored_at < ?")
            .bind(cutoff_millis)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
