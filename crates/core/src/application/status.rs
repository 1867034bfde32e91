// Status API: answer "where is job X?"
use crate::domain::{JobId, JobState};
use crate::error::Result;
use crate::port::{JobQueue, ResultStore};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// `None` once the stored result has been purged by retention
    Completed(Option<String>),
    Waiting,
    Active,
    Failed(Option<String>),
    NotFound,
}

impl PollOutcome {
    pub fn status(&self) -> Option<JobState> {
        match self {
            PollOutcome::Completed(_) => Some(JobState::Completed),
            PollOutcome::Waiting => Some(JobState::Waiting),
            PollOutcome::Active => Some(JobState::Active),
            PollOutcome::Failed(_) => Some(JobState::Failed),
            PollOutcome::NotFound => None,
        }
    }
}

pub struct StatusService {
    job_queue: Arc<dyn JobQueue>,
    result_store: Arc<dyn ResultStore>,
}

impl StatusService {
    pub fn new(job_queue: Arc<dyn JobQueue>, result_store: Arc<dyn ResultStore>) -> Self {
        Self {
            job_queue,
            result_store,
        }
    }

    /// The result store is consulted first: a stored value is proof of completion.
    pub async fn poll(&self, id: &JobId) -> Result<PollOutcome> {
        if let Some(value) = self.result_store.get(id).await? {
            return Ok(PollOutcome::Completed(Some(value)));
        }

        let job = match self.job_queue.find_by_id(id).await? {
            Some(job) => job,
            None => {
                debug!(job_id = %id, "Poll for unknown job");
                return Ok(PollOutcome::NotFound);
            }
        };

        Ok(match job.state {
            JobState::Waiting => PollOutcome::Waiting,
            JobState::Active => PollOutcome::Active,
            JobState::Failed => PollOutcome::Failed(job.last_error),
            JobState::Completed => PollOutcome::Completed(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::constants::DEFAULT_QUEUE;
    use crate::application::worker::test_support::Harness;
    use crate::port::collaborator::mocks::MockCollaborator;

    fn service(h: &Harness) -> StatusService {
        StatusService::new(h.queue.clone(), h.results.clone())
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let h = Harness::new(MockCollaborator::replying("x"));
        let outcome = service(&h).poll(&"does-not-exist".to_string()).await.unwrap();
        assert_eq!(outcome, PollOutcome::NotFound);
        assert_eq!(outcome.status(), None);
    }

    #[tokio::test]
    async fn test_follows_job_through_its_states() {
        let h = Harness::new(MockCollaborator::replying("a cat"));
        let job = h.submit("j1", "a.png", "image/png", 1).await;
        let status = service(&h);

        assert_eq!(status.poll(&job.id).await.unwrap(), PollOutcome::Waiting);

        let claimed = h.queue.claim_next(DEFAULT_QUEUE, 60_000).await.unwrap().unwrap();
        assert_eq!(status.poll(&job.id).await.unwrap(), PollOutcome::Active);

        h.worker.execute_claimed(claimed).await.unwrap();
        assert_eq!(
            status.poll(&job.id).await.unwrap(),
            PollOutcome::Completed(Some("a cat".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stored_result_wins_over_queue_state() {
        let h = Harness::new(MockCollaborator::replying("x"));
        let job = h.submit("j1", "a.png", "image/png", 1).await;
        h.results.put(&job.id, "already done").await.unwrap();

        assert_eq!(
            service(&h).poll(&job.id).await.unwrap(),
            PollOutcome::Completed(Some("already done".to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_job_reports_reason() {
        let h = Harness::new(MockCollaborator::failing("model refused"));
        let job = h.submit("j1", "doc.pdf", "application/pdf", 1).await;
        h.worker.process_next_job().await.unwrap();

        match service(&h).poll(&job.id).await.unwrap() {
            PollOutcome::Failed(Some(reason)) => assert!(reason.contains("model refused")),
            other => panic!("expected failed, got {:?}", other),
        }
    }
}
