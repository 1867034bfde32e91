// Submission use case: accept an artifact, enqueue a job for it

use crate::application::worker::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_QUEUE, INLINE_QUEUE};
use crate::application::worker::{JobOutcome, Worker};
use crate::domain::{ArtifactPayload, Job, JobId};
use crate::error::{AppError, Result};
use crate::port::{ArtifactStore, IdProvider, JobQueue, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// How the gateway answers an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionMode {
    /// Respond with the job id immediately, a worker picks the job up later
    #[default]
    Queued,
    /// Process the job inline and respond with its outcome
    Synchronous,
}

impl std::str::FromStr for SubmissionMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" | "async" => Ok(SubmissionMode::Queued),
            "sync" | "synchronous" => Ok(SubmissionMode::Synchronous),
            other => Err(AppError::Config(format!(
                "Unknown submission mode {:?} (expected queued or sync)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued(JobId),
    Finished { job_id: JobId, outcome: JobOutcome },
}

impl SubmitOutcome {
    pub fn job_id(&self) -> &JobId {
        match self {
            SubmitOutcome::Queued(id) => id,
            SubmitOutcome::Finished { job_id, .. } => job_id,
        }
    }
}

pub struct SubmissionService {
    job_queue: Arc<dyn JobQueue>,
    artifact_store: Arc<dyn ArtifactStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    max_attempts: i32,
    inline_worker: Option<Arc<Worker>>,
}

impl SubmissionService {
    /// Queued mode
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        artifact_store: Arc<dyn ArtifactStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_queue,
            artifact_store,
            id_provider,
            time_provider,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            inline_worker: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Switch to synchronous mode, executing jobs on `worker`
    pub fn with_inline_worker(mut self, worker: Arc<Worker>) -> Self {
        self.inline_worker = Some(worker);
        self
    }

    pub fn mode(&self) -> SubmissionMode {
        if self.inline_worker.is_some() {
            SubmissionMode::Synchronous
        } else {
            SubmissionMode::Queued
        }
    }

    /// Persist uploaded bytes and submit a job for them
    ///
    /// The artifact is removed again if the job cannot be enqueued.
    pub async fn accept_upload(
        &self,
        original_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<SubmitOutcome> {
        if original_name.trim().is_empty() {
            return Err(AppError::Validation("No file uploaded.".to_string()));
        }

        let path = self.artifact_store.save(original_name, bytes).await?;
        let payload = ArtifactPayload::new(path, mime_type, original_name);

        match self.enqueue(payload.clone()).await {
            Ok(job_id) => self.finish(job_id).await,
            Err(e) => {
                if let Err(cleanup) = self.artifact_store.remove(&payload.path).await {
                    warn!(path = %payload.path, error = %cleanup, "Artifact cleanup failed");
                }
                Err(e)
            }
        }
    }

    /// Enqueue a job for an artifact already in the store
    pub async fn submit(&self, payload: ArtifactPayload) -> Result<SubmitOutcome> {
        let job_id = self.enqueue(payload).await?;
        self.finish(job_id).await
    }

    /// Durably persist a `Waiting` job; never waits on a worker
    pub async fn enqueue(&self, payload: ArtifactPayload) -> Result<JobId> {
        payload
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let queue = match self.mode() {
            SubmissionMode::Queued => DEFAULT_QUEUE,
            SubmissionMode::Synchronous => INLINE_QUEUE,
        };

        let job = Job::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            queue,
            payload,
            self.max_attempts,
        );
        self.job_queue.insert(&job).await?;

        info!(
            job_id = %job.id,
            queue = %job.queue,
            mode = %job.payload.mode(),
            file = %job.payload.original_name,
            "Job enqueued"
        );
        Ok(job.id)
    }

    async fn finish(&self, job_id: JobId) -> Result<SubmitOutcome> {
        match &self.inline_worker {
            None => Ok(SubmitOutcome::Queued(job_id)),
            Some(worker) => {
                // Detached: a dropped request stops the wait, never the job
                let worker = Arc::clone(worker);
                let id = job_id.clone();
                let outcome = tokio::spawn(async move { worker.run_inline(&id).await })
                    .await
                    .map_err(|e| AppError::Internal(format!("Inline execution aborted: {}", e)))??;
                Ok(SubmitOutcome::Finished { job_id, outcome })
            }
        }
    }
}
