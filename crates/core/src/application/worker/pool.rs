// Worker pool: N worker loops plus the lease reaper, one shutdown token

use super::{ShutdownToken, Worker};
use crate::application::recovery::LeaseRecovery;
use crate::error::Result;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

pub struct WorkerPool {
    worker: Arc<Worker>,
    size: usize,
    recovery: Option<Arc<LeaseRecovery>>,
}

impl WorkerPool {
    /// `size` loops share one `Worker`; it holds no per-job state
    pub fn new(worker: Arc<Worker>, size: usize) -> Self {
        Self {
            worker,
            size: size.max(1),
            recovery: None,
        }
    }

    pub fn with_recovery(mut self, recovery: Arc<LeaseRecovery>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run until shutdown and every loop has drained
    pub async fn run(self, shutdown: ShutdownToken) -> Result<()> {
        let mut tasks = JoinSet::new();

        for index in 0..self.size {
            let worker = Arc::clone(&self.worker);
            let token = shutdown.clone();
            tasks.spawn(async move {
                let result = worker.run(token).await;
                (index, result)
            });
        }

        if let Some(recovery) = self.recovery {
            let token = shutdown.clone();
            tasks.spawn(async move {
                recovery.run(token).await;
                (usize::MAX, Ok(()))
            });
        }

        info!(
            workers = self.size,
            queue = %self.worker.settings().queue,
            "Worker pool started"
        );

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(e))) => error!(worker = index, error = %e, "Worker exited with error"),
                Err(e) => error!(error = %e, "Worker task aborted"),
            }
        }

        info!("Worker pool stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::super::shutdown_channel;
    use super::*;
    use crate::domain::JobState;
    use crate::port::collaborator::mocks::MockCollaborator;
    use crate::port::{JobQueue, ResultStore};
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_drains_queue_then_stops() {
        let h = Harness::new(MockCollaborator::replying("done"));
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(h.submit(&format!("job-{}", i), "a.png", "image/png", 1).await.id);
        }

        let (tx, token) = shutdown_channel();
        let pool = WorkerPool::new(h.worker.clone(), 3);
        assert_eq!(pool.size(), 3);
        let handle = tokio::spawn(pool.run(token));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let mut done = 0;
            for id in &ids {
                if h.queue.get_state(id).await.unwrap() == Some(JobState::Completed) {
                    done += 1;
                }
            }
            if done == ids.len() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "pool did not drain the queue");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        for id in &ids {
            assert_eq!(h.results.get(id).await.unwrap().as_deref(), Some("done"));
        }
        assert_eq!(h.collaborator.upload_count(), ids.len());

        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
