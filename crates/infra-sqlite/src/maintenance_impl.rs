// SQLite Maintenance Implementation
use crate::error::map_sqlx_error;
use crate::SqliteResultStore;
use async_trait::async_trait;
use parcel_core::domain::JobState;
use parcel_core::error::{AppError, Result};
use parcel_core::port::{Maintenance, MaintenanceStats, ResultStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
    results: SqliteResultStore,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            results: SqliteResultStore::new(pool.clone(), Arc::clone(&time_provider)),
            pool,
            time_provider,
        }
    }

    fn cutoff(&self, retention_days: i64) -> i64 {
        self.time_provider.now_millis() - retention_days * DAY_MS
    }

    /// Get DB file size in bytes
    async fn get_db_size(&self) -> Result<i64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page size: {}", e)))?;

        Ok(page_count * page_size)
    }
}

fn to_mb(bytes: i64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        let size_before = to_mb(self.get_db_size().await?);

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("VACUUM failed: {}", e)))?;

        let size_after = to_mb(self.get_db_size().await?);
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn gc_finished_jobs(&self, retention_days: i64) -> Result<i64> {
        let cutoff_time = self.cutoff(retention_days);

        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE state IN (?, ?)
            AND finished_at IS NOT NULL
            AND finished_at < ?
            "#,
        )
        .bind(JobState::Completed.as_str())
        .bind(JobState::Failed.as_str())
        .bind(cutoff_time)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected() as i64;
        info!(retention_days, deleted_jobs = deleted, "Finished job GC completed");
        Ok(deleted)
    }

    async fn gc_results(&self, retention_days: i64) -> Result<i64> {
        let deleted = self.results.purge_before(self.cutoff(retention_days)).await? as i64;
        info!(retention_days, deleted_results = deleted, "Result GC completed");
        Ok(deleted)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let db_size_bytes = self.get_db_size().await?;

        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let finished_job_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE state IN (?, ?)")
                .bind(JobState::Completed.as_str())
                .bind(JobState::Failed.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let result_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(MaintenanceStats {
            db_size_mb: to_mb(db_size_bytes),
            db_size_bytes,
            job_count,
            finished_job_count,
            result_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteJobQueue};
    use parcel_core::domain::{ArtifactPayload, Job};
    use parcel_core::port::time_provider::mocks::ManualClock;
    use parcel_core::port::{JobQueue, MaintenanceConfig};

    async fn setup() -> (SqlitePool, Arc<ManualClock>) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, Arc::new(ManualClock::new(DAY_MS)))
    }

    async fn finished_job(queue: &SqliteJobQueue, id: &str, fail: bool) {
        let job = Job::new(
            id,
            0,
            "default",
            ArtifactPayload::new("/tmp/x.pdf", "application/pdf", "x.pdf"),
            1,
        );
        queue.insert(&job).await.unwrap();
        queue.claim(&job.id, 1_000).await.unwrap();
        if fail {
            queue.mark_failed(&job.id, "boom").await.unwrap();
        } else {
            queue.mark_completed(&job.id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_maintenance_stats() {
        let (pool, clock) = setup().await;
        let maintenance = SqliteMaintenance::new(pool, clock);

        let stats = maintenance.get_stats().await.unwrap();
        assert!(stats.db_size_bytes > 0);
        assert_eq!(stats.job_count, 0);
        assert_eq!(stats.finished_job_count, 0);
        assert_eq!(stats.result_count, 0);
    }

    #[tokio::test]
    async fn test_vacuum() {
        let (pool, clock) = setup().await;
        let maintenance = SqliteMaintenance::new(pool, clock);
        assert!(maintenance.vacuum().await.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_gc_keeps_recent_and_unfinished_jobs() {
        let (pool, clock) = setup().await;
        let queue = SqliteJobQueue::new(pool.clone(), clock.clone());
        let maintenance = SqliteMaintenance::new(pool, clock.clone());

        finished_job(&queue, "old-done", false).await;
        finished_job(&queue, "old-failed", true).await;
        queue
            .insert(&Job::new(
                "still-waiting",
                0,
                "default",
                ArtifactPayload::new("/tmp/y.png", "image/png", "y.png"),
                1,
            ))
            .await
            .unwrap();

        clock.advance(10 * DAY_MS);
        finished_job(&queue, "recent", false).await;

        assert_eq!(maintenance.gc_finished_jobs(7).await.unwrap(), 2);
        assert!(queue.find_by_id(&"old-done".to_string()).await.unwrap().is_none());
        assert!(queue.find_by_id(&"recent".to_string()).await.unwrap().is_some());
        assert!(queue
            .find_by_id(&"still-waiting".to_string())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_full_maintenance_expires_results() {
        let (pool, clock) = setup().await;
        let results = SqliteResultStore::new(pool.clone(), clock.clone());
        let maintenance = SqliteMaintenance::new(pool, clock.clone());

        results.put(&"old".to_string(), "a").await.unwrap();
        clock.advance(8 * DAY_MS);
        results.put(&"fresh".to_string(), "b").await.unwrap();

        let stats = maintenance
            .run_full_maintenance(&MaintenanceConfig::default())
            .await
            .unwrap();
        assert_eq!(stats.result_count, 1);
        assert!(results.get(&"old".to_string()).await.unwrap().is_none());
    }
}
