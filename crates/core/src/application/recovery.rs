// Lease recovery: no claim is left active forever
use crate::application::worker::release_artifact;
use crate::application::worker::ShutdownToken;
use crate::domain::Job;
use crate::error::Result;
use crate::port::{ArtifactStore, JobQueue, ResultStore, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::worker::constants::{INLINE_QUEUE, REAPER_INTERVAL};

/// Reason recorded on jobs whose final attempt lost its lease
pub const LEASE_EXPIRED_REASON: &str = "lease expired";

/// Lease reaper
///
/// Runs once at startup and then every `interval`. An `active` job whose lease
/// has passed belonged to a worker that crashed or stalled.
pub struct LeaseRecovery {
    job_queue: Arc<dyn JobQueue>,
    result_store: Arc<dyn ResultStore>,
    artifact_store: Arc<dyn ArtifactStore>,
    time_provider: Arc<dyn TimeProvider>,
    interval: Duration,
}

impl LeaseRecovery {
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        result_store: Arc<dyn ResultStore>,
        artifact_store: Arc<dyn ArtifactStore>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_queue,
            result_store,
            artifact_store,
            time_provider,
            interval: REAPER_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Resolve every expired lease
    ///
    /// Algorithm:
    /// 1. Result already stored: the worker died between the result write and
    ///    the state change, so complete the job
    /// 2. Attempts remaining: requeue, artifact kept
    /// 3. Otherwise: fail with "lease expired"
    ///
    /// Inline jobs belong to the request that submitted them and no pool
    /// worker claims from the inline queue, so they skip step 2.
    ///
    /// # Returns
    /// Number of jobs recovered
    pub async fn recover_expired_leases(&self) -> Result<usize> {
        let expired = self.job_queue.find_expired_leases().await?;
        if expired.is_empty() {
            return Ok(0);
        }

        info!(count = expired.len(), "Recovering expired leases");

        let mut recovered = 0;
        for job in expired {
            // A worker may settle the job concurrently; skip and move on
            match self.recover_job(&job).await {
                Ok(()) => recovered += 1,
                Err(e) => warn!(job_id = %job.id, error = %e, "Lease recovery skipped job"),
            }
        }

        info!(recovered, "Lease recovery complete");
        Ok(recovered)
    }

    async fn recover_job(&self, job: &Job) -> Result<()> {
        if self.result_store.get(&job.id).await?.is_some() {
            self.job_queue.mark_completed(&job.id).await?;
            info!(job_id = %job.id, "Completed job with stored result");
            release_artifact(self.artifact_store.as_ref(), job).await;
        } else if job.has_attempts_left() && job.queue != INLINE_QUEUE {
            let now = self.time_provider.now_millis();
            self.job_queue
                .requeue(&job.id, LEASE_EXPIRED_REASON, now)
                .await?;
            info!(job_id = %job.id, attempts = job.attempts, "Requeued job after lease expiry");
        } else {
            self.job_queue
                .mark_failed(&job.id, LEASE_EXPIRED_REASON)
                .await?;
            warn!(job_id = %job.id, attempts = job.attempts, "Failed job after lease expiry");
            release_artifact(self.artifact_store.as_ref(), job).await;
        }
        Ok(())
    }

    /// Reaper loop (background task)
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(interval_secs = self.interval.as_secs(), "Lease reaper started");
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.recover_expired_leases().await {
                        error!(error = %e, "Lease recovery failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        info!("Lease reaper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::constants::DEFAULT_QUEUE;
    use crate::application::worker::test_support::Harness;
    use crate::domain::JobState;
    use crate::port::collaborator::mocks::MockCollaborator;

    fn recovery(h: &Harness) -> LeaseRecovery {
        LeaseRecovery::new(
            h.queue.clone(),
            h.results.clone(),
            h.artifacts.clone(),
            h.clock.clone(),
        )
    }

    async fn claim_and_expire(h: &Harness) -> Job {
        let job = h.queue.claim_next(DEFAULT_QUEUE, 1_000).await.unwrap().unwrap();
        h.clock.advance(1_000);
        job
    }

    #[tokio::test]
    async fn test_live_leases_are_left_alone() {
        let h = Harness::new(MockCollaborator::replying("x"));
        let job = h.submit("j1", "a.png", "image/png", 1).await;
        h.queue.claim_next(DEFAULT_QUEUE, 1_000).await.unwrap();

        assert_eq!(recovery(&h).recover_expired_leases().await.unwrap(), 0);
        assert_eq!(h.queue.get_state(&job.id).await.unwrap(), Some(JobState::Active));
    }

    #[tokio::test]
    async fn test_stored_result_completes_job() {
        let h = Harness::new(MockCollaborator::replying("x"));
        let job = h.submit("j1", "a.png", "image/png", 1).await;
        claim_and_expire(&h).await;
        h.results.put(&job.id, "finished before crash").await.unwrap();

        assert_eq!(recovery(&h).recover_expired_leases().await.unwrap(), 1);
        assert_eq!(h.queue.get_state(&job.id).await.unwrap(), Some(JobState::Completed));
        assert!(!h.artifacts.exists(&job.payload.path).await);
        assert_eq!(h.artifacts.removal_count(), 1);
    }

    #[tokio::test]
    async fn test_attempts_remaining_requeues_and_keeps_artifact() {
        let h = Harness::new(MockCollaborator::replying("x"));
        let job = h.submit("j1", "doc.pdf", "application/pdf", 2).await;
        claim_and_expire(&h).await;

        recovery(&h).recover_expired_leases().await.unwrap();

        let stored = h.queue.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Waiting);
        assert_eq!(stored.last_error.as_deref(), Some(LEASE_EXPIRED_REASON));
        assert!(h.artifacts.exists(&job.payload.path).await);

        // The requeued job runs to completion on the next claim
        assert!(h.worker.process_next_job().await.unwrap());
        assert_eq!(h.queue.get_state(&job.id).await.unwrap(), Some(JobState::Completed));
    }

    #[tokio::test]
    async fn test_spent_budget_fails_and_releases_artifact() {
        let h = Harness::new(MockCollaborator::replying("x"));
        let job = h.submit("j1", "doc.pdf", "application/pdf", 1).await;
        claim_and_expire(&h).await;

        recovery(&h).recover_expired_leases().await.unwrap();

        let stored = h.queue.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failed);
        assert_eq!(stored.last_error.as_deref(), Some(LEASE_EXPIRED_REASON));
        assert!(!h.artifacts.exists(&job.payload.path).await);
    }

    #[tokio::test]
    async fn test_orphaned_inline_job_fails_instead_of_requeueing() {
        let h = Harness::new(MockCollaborator::replying("x"));
        let path = h.artifacts.save("a.png", b"png").await.unwrap();
        let job = Job::new(
            "inline-1",
            h.clock.now_millis(),
            INLINE_QUEUE,
            crate::domain::ArtifactPayload::new(path, "image/png", "a.png"),
            3,
        );
        h.queue.insert(&job).await.unwrap();
        h.queue.claim(&job.id, 1_000).await.unwrap().unwrap();
        h.clock.advance(1_000);

        assert_eq!(recovery(&h).recover_expired_leases().await.unwrap(), 1);
        assert_eq!(h.queue.get_state(&job.id).await.unwrap(), Some(JobState::Failed));
        assert!(!h.artifacts.exists(&job.payload.path).await);
    }

    #[tokio::test]
    async fn test_reaper_loop_stops_on_shutdown() {
        let h = Harness::new(MockCollaborator::replying("x"));
        let reaper = Arc::new(recovery(&h).with_interval(Duration::from_millis(10)));
        let (tx, token) = crate::application::worker::shutdown_channel();

        let task = {
            let reaper = reaper.clone();
            tokio::spawn(async move { reaper.run(token).await })
        };
        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
