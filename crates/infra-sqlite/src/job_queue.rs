// SQLite JobQueue Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use parcel_core::domain::{ArtifactPayload, Job, JobId, JobState};
use parcel_core::error::{AppError, Result};
use parcel_core::port::job_queue::resolve_unapplied_transition;
use parcel_core::port::{JobQueue, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

pub struct SqliteJobQueue {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobQueue {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Terminal transition guarded on `state = 'active'`
    ///
    /// A miss is resolved against the current state so repeats are no-ops
    /// and conflicting outcomes surface.
    async fn finish(&self, id: &JobId, target: JobState, reason: Option<&str>) -> Result<()> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, finished_at = COALESCE(finished_at, ?),
                lease_expires_at = NULL, last_error = COALESCE(?, last_error)
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(target.as_str())
        .bind(now)
        .bind(reason)
        .bind(id)
        .bind(JobState::Active.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let current = self.get_state(id).await?;
            return resolve_unapplied_transition(id, current, target);
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn insert(&self, job: &Job) -> Result<()> {
        let payload = serde_json::to_string(&job.payload)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, queue, state, payload,
                attempts, max_attempts,
                created_at, available_at, started_at, finished_at,
                lease_expires_at, last_error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.queue)
        .bind(job.state.as_str())
        .bind(payload)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.created_at)
        .bind(job.available_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.lease_expires_at)
        .bind(&job.last_error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn get_state(&self, id: &JobId) -> Result<Option<JobState>> {
        let state: Option<String> = sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(state.map(|s| s.parse::<JobState>()).transpose()?)
    }

    async fn claim_next(&self, queue: &str, lease_ms: i64) -> Result<Option<Job>> {
        // Single statement: the subselect and the update share one write lock,
        // so concurrent claimers (threads or processes) never get the same row
        let now = self.time_provider.now_millis();
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = ?, attempts = attempts + 1,
                started_at = COALESCE(started_at, ?), lease_expires_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = ? AND state = ? AND available_at <= ?
                ORDER BY created_at ASC, id ASC
                LIMIT 1
            )
            AND state = ?
            RETURNING *
            "#,
        )
        .bind(JobState::Active.as_str())
        .bind(now)
        .bind(now + lease_ms)
        .bind(queue)
        .bind(JobState::Waiting.as_str())
        .bind(now)
        .bind(JobState::Waiting.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let job = row.map(JobRow::into_job).transpose()?;
        if let Some(job) = &job {
            debug!(job_id = %job.id, queue = %queue, attempt = job.attempts, "Claimed job");
        }
        Ok(job)
    }

    async fn claim(&self, id: &JobId, lease_ms: i64) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = ?, attempts = attempts + 1,
                started_at = COALESCE(started_at, ?), lease_expires_at = ?
            WHERE id = ? AND state = ?
            RETURNING *
            "#,
        )
        .bind(JobState::Active.as_str())
        .bind(now)
        .bind(now + lease_ms)
        .bind(id)
        .bind(JobState::Waiting.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn mark_completed(&self, id: &JobId) -> Result<()> {
        self.finish(id, JobState::Completed, None).await
    }

    async fn mark_failed(&self, id: &JobId, reason: &str) -> Result<()> {
        self.finish(id, JobState::Failed, Some(reason)).await
    }

    async fn requeue(&self, id: &JobId, reason: &str, available_at: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, available_at = ?, lease_expires_at = NULL, last_error = ?
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(JobState::Waiting.as_str())
        .bind(available_at)
        .bind(reason)
        .bind(id)
        .bind(JobState::Active.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return match self.get_state(id).await? {
                None => Err(AppError::NotFound(format!("Job {} not found", id))),
                Some(state) => Err(AppError::InvalidState(format!(
                    "Cannot requeue job {} from {}",
                    id, state
                ))),
            };
        }
        Ok(())
    }

    async fn count_by_state(&self, queue: &str, state: JobState) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE queue = ? AND state = ?")
                .bind(queue)
                .bind(state.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn find_expired_leases(&self) -> Result<Vec<Job>> {
        let now = self.time_provider.now_millis();
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE state = ? AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(JobState::Active.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    queue: String,
    state: String,
    payload: String,
    attempts: i32,
    max_attempts: i32,
    created_at: i64,
    available_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    lease_expires_at: Option<i64>,
    last_error: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let payload: ArtifactPayload = serde_json::from_str(&self.payload)?;

        Ok(Job {
            id: self.id,
            queue: self.queue,
            state: self.state.parse()?,
            payload,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            created_at: self.created_at,
            available_at: self.available_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            lease_expires_at: self.lease_expires_at,
            last_error: self.last_error,
        })
    }
}
