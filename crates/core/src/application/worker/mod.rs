// Worker - Job execution loop

pub mod constants;
mod pool;
mod shutdown;

use constants::*;
pub use pool::WorkerPool;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::processing::ArtifactProcessor;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{Job, JobId};
use crate::error::{AppError, Result};
use crate::port::{ArtifactStore, CollaboratorError, JobQueue, ResultStore, TimeProvider};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Per-worker settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Queue this worker claims from
    pub queue: String,
    /// Claim lease, must outlast the collaborator timeout
    pub lease_ms: i64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            lease_ms: DEFAULT_LEASE_MS,
        }
    }
}

/// How a claimed job left the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(String),
    Failed(String),
    Requeued { reason: String, available_at: i64 },
}

impl JobOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobOutcome::Requeued { .. })
    }
}

/// Worker claims jobs from a queue and drives them to an outcome
pub struct Worker {
    settings: WorkerSettings,
    job_queue: Arc<dyn JobQueue>,
    result_store: Arc<dyn ResultStore>,
    artifact_store: Arc<dyn ArtifactStore>,
    processor: Arc<ArtifactProcessor>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Worker {
    pub fn new(
        settings: WorkerSettings,
        job_queue: Arc<dyn JobQueue>,
        result_store: Arc<dyn ResultStore>,
        artifact_store: Arc<dyn ArtifactStore>,
        processor: Arc<ArtifactProcessor>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            settings,
            job_queue,
            result_store,
            artifact_store,
            processor,
            retry_policy,
            time_provider,
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(queue = %self.settings.queue, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = sleep(IDLE_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    error!(queue = %self.settings.queue, error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }
        info!(queue = %self.settings.queue, "Worker stopped");
        Ok(())
    }

    /// Claim and execute the next job (returns true if a job was processed)
    pub async fn process_next_job(&self) -> Result<bool> {
        let job = match self
            .job_queue
            .claim_next(&self.settings.queue, self.settings.lease_ms)
            .await?
        {
            Some(job) => job,
            None => return Ok(false),
        };

        self.execute_claimed(job).await?;
        Ok(true)
    }

    /// Claim one specific job by id and execute it in the caller's task,
    /// requeued attempts included, until it reaches a terminal outcome
    pub async fn run_inline(&self, job_id: &JobId) -> Result<JobOutcome> {
        loop {
            let job = self
                .job_queue
                .claim(job_id, self.settings.lease_ms)
                .await?
                .ok_or_else(|| AppError::InvalidState(format!("Job {} is not claimable", job_id)))?;

            match self.execute_claimed(job).await? {
                JobOutcome::Requeued { available_at, .. } => {
                    let wait_ms = (available_at - self.time_provider.now_millis()).max(0);
                    sleep(std::time::Duration::from_millis(wait_ms as u64)).await;
                }
                outcome => return Ok(outcome),
            }
        }
    }

    /// Run the processing protocol for a job this worker has claimed
    ///
    /// The collaborator round trip runs in its own task so a panic in an
    /// adapter ends the attempt instead of the worker loop.
    pub async fn execute_claimed(&self, job: Job) -> Result<JobOutcome> {
        info!(
            job_id = %job.id,
            attempt = job.attempts,
            mode = %job.payload.mode(),
            file = %job.payload.original_name,
            "Processing job"
        );

        let processor = Arc::clone(&self.processor);
        let job_id = job.id.clone();
        let payload = job.payload.clone();
        let handle = tokio::spawn(async move { processor.process(&job_id, &payload).await });

        let attempt = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "Processing task aborted");
                Err(CollaboratorError::Panicked(join_err.to_string()))
            }
        };

        match attempt {
            Ok(text) => match self.result_store.put(&job.id, &text).await {
                Ok(()) => {
                    self.job_queue.mark_completed(&job.id).await?;
                    info!(job_id = %job.id, chars = text.len(), "Job completed");
                    self.release_artifact(&job).await;
                    Ok(JobOutcome::Completed(text))
                }
                Err(e) => {
                    self.fail_attempt(&job, format!("Result write failed: {}", e))
                        .await
                }
            },
            Err(e) => self.fail_attempt(&job, e.to_string()).await,
        }
    }

    async fn fail_attempt(&self, job: &Job, reason: String) -> Result<JobOutcome> {
        match self.retry_policy.should_retry(job) {
            RetryDecision::Retry { available_at } => {
                self.job_queue.requeue(&job.id, &reason, available_at).await?;
                Ok(JobOutcome::Requeued {
                    reason,
                    available_at,
                })
            }
            RetryDecision::Failed => {
                self.job_queue.mark_failed(&job.id, &reason).await?;
                error!(job_id = %job.id, reason = %reason, "Job failed");
                self.release_artifact(job).await;
                Ok(JobOutcome::Failed(reason))
            }
        }
    }

    /// Delete the job's artifact; failures are logged and swallowed
    pub async fn release_artifact(&self, job: &Job) {
        release_artifact(self.artifact_store.as_ref(), job).await;
    }
}

/// Artifact cleanup on a terminal transition
pub(crate) async fn release_artifact(store: &dyn ArtifactStore, job: &Job) {
    if let Err(e) = store.remove(&job.payload.path).await {
        warn!(job_id = %job.id, error = %e, "Artifact cleanup failed");
    }
}
