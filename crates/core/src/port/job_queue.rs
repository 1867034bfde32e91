// Job Queue Port (Interface)

use crate::domain::{Job, JobId, JobState};
use crate::error::{AppError, Result};
use async_trait::async_trait;

/// Durable, claim-based job queue
///
/// Implementations read the current time from their injected `TimeProvider`.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist a new `Waiting` job. Durable once this returns `Ok`.
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Current state, `None` if the id was never issued or has been purged
    async fn get_state(&self, id: &JobId) -> Result<Option<JobState>>;

    /// Atomically claim the oldest claimable `Waiting` job of `queue`
    ///
    /// The claimed job is `Active`, has its attempt counted and holds a lease
    /// of `lease_ms`. Two concurrent callers never receive the same job.
    async fn claim_next(&self, queue: &str, lease_ms: i64) -> Result<Option<Job>>;

    /// Atomically claim one specific `Waiting` job
    async fn claim(&self, id: &JobId, lease_ms: i64) -> Result<Option<Job>>;

    /// `Active -> Completed`. Repeating it is a no-op; a failed job is a conflict.
    async fn mark_completed(&self, id: &JobId) -> Result<()>;

    /// `Active -> Failed`. Repeating it is a no-op; a completed job is a conflict.
    async fn mark_failed(&self, id: &JobId, reason: &str) -> Result<()>;

    /// `Active -> Waiting`, claimable again from `available_at`
    async fn requeue(&self, id: &JobId, reason: &str, available_at: i64) -> Result<()>;

    /// Count jobs by state
    async fn count_by_state(&self, queue: &str, state: JobState) -> Result<i64>;

    /// `Active` jobs whose lease deadline has passed
    async fn find_expired_leases(&self) -> Result<Vec<Job>>;
}

/// Outcome of a terminal transition that matched no `Active` row
///
/// Shared by every implementation so the idempotency/conflict rules agree.
pub fn resolve_unapplied_transition(
    id: &JobId,
    current: Option<JobState>,
    target: JobState,
) -> Result<()> {
    match current {
        None => Err(AppError::NotFound(format!("Job {} not found", id))),
        Some(state) if state == target => Ok(()),
        Some(state) if state.is_terminal() => Err(AppError::Conflict(format!(
            "Job {} is already {}, cannot mark it {}",
            id, state, target
        ))),
        Some(state) => Err(AppError::InvalidState(format!(
            "Cannot move job {} from {} to {}",
            id, state, target
        ))),
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::TimeProvider;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory queue with the same claim and transition rules as SQLite
    pub struct InMemoryJobQueue {
        jobs: Mutex<HashMap<JobId, Job>>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryJobQueue {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                jobs: Mutex::new(HashMap::new()),
                time_provider,
            }
        }

        fn apply_terminal(&self, id: &JobId, target: JobState, reason: Option<&str>) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(id) {
                Some(job) if job.state == JobState::Active => {
                    match (target, reason) {
                        (JobState::Failed, Some(reason)) => job.fail(now, reason)?,
                        _ => job.complete(now)?,
                    }
                    Ok(())
                }
                other => {
                    let current = other.map(|j| j.state);
                    resolve_unapplied_transition(id, current, target)
                }
            }
        }
    }

    #[async_trait]
    impl JobQueue for InMemoryJobQueue {
        async fn insert(&self, job: &Job) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&job.id) {
                return Err(AppError::Conflict(format!("Job {} already exists", job.id)));
            }
            jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn get_state(&self, id: &JobId) -> Result<Option<JobState>> {
            Ok(self.jobs.lock().unwrap().get(id).map(|j| j.state))
        }

        async fn claim_next(&self, queue: &str, lease_ms: i64) -> Result<Option<Job>> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let next = jobs
                .values_mut()
                .filter(|j| j.queue == queue && j.state == JobState::Waiting && j.available_at <= now)
                .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
            match next {
                Some(job) => {
                    job.start(now, lease_ms)?;
                    Ok(Some(job.clone()))
                }
                None => Ok(None),
            }
        }

        async fn claim(&self, id: &JobId, lease_ms: i64) -> Result<Option<Job>> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(id) {
                Some(job) if job.state == JobState::Waiting => {
                    job.start(now, lease_ms)?;
                    Ok(Some(job.clone()))
                }
                _ => Ok(None),
            }
        }

        async fn mark_completed(&self, id: &JobId) -> Result<()> {
            self.apply_terminal(id, JobState::Completed, None)
        }

        async fn mark_failed(&self, id: &JobId, reason: &str) -> Result<()> {
            self.apply_terminal(id, JobState::Failed, Some(reason))
        }

        async fn requeue(&self, id: &JobId, reason: &str, available_at: i64) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
            job.requeue(available_at, reason)?;
            Ok(())
        }

        async fn count_by_state(&self, queue: &str, state: JobState) -> Result<i64> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs
                .values()
                .filter(|j| j.queue == queue && j.state == state)
                .count() as i64)
        }

        async fn find_expired_leases(&self) -> Result<Vec<Job>> {
            let now = self.time_provider.now_millis();
            let jobs = self.jobs.lock().unwrap();
            let mut expired: Vec<Job> = jobs
                .values()
                .filter(|j| j.is_lease_expired(now))
                .cloned()
                .collect();
            expired.sort_by_key(|j| j.created_at);
            Ok(expired)
        }
    }
}
