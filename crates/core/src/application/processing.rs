// Processing protocol: one artifact through the collaborator
//
// Shared by the background worker pool and the synchronous gateway mode.

use crate::domain::{ArtifactPayload, JobId};
use crate::port::{ArtifactStore, Collaborator, CollaboratorError, SnapshotStream};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs upload -> thread -> run for a single artifact
pub struct ArtifactProcessor {
    collaborator: Arc<dyn Collaborator>,
    artifact_store: Arc<dyn ArtifactStore>,
    timeout: Duration,
}

impl ArtifactProcessor {
    /// # Arguments
    /// * `collaborator` - External assistant service
    /// * `artifact_store` - Where uploaded artifacts are read from
    /// * `timeout` - Bound on the whole collaborator round trip
    pub fn new(
        collaborator: Arc<dyn Collaborator>,
        artifact_store: Arc<dyn ArtifactStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            collaborator,
            artifact_store,
            timeout,
        }
    }

    /// Produce the final response text for one artifact
    ///
    /// Does not touch job state, the result store or the artifact's lifetime;
    /// the caller owns those.
    pub async fn process(
        &self,
        job_id: &JobId,
        payload: &ArtifactPayload,
    ) -> Result<String, CollaboratorError> {
        match tokio::time::timeout(self.timeout, self.round_trip(job_id, payload)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(job_id = %job_id, timeout_secs = self.timeout.as_secs(), "Collaborator round trip timed out");
                Err(CollaboratorError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    async fn round_trip(
        &self,
        job_id: &JobId,
        payload: &ArtifactPayload,
    ) -> Result<String, CollaboratorError> {
        let mode = payload.mode();

        let bytes = self
            .artifact_store
            .read(&payload.path)
            .await
            .map_err(|e| CollaboratorError::Artifact(format!("{}: {}", payload.path, e)))?;

        let file_id = self
            .collaborator
            .upload_file(&payload.original_name, &payload.mime_type, bytes, mode)
            .await?;
        info!(job_id = %job_id, file_id = %file_id, mode = %mode, "Uploaded artifact");

        let thread_id = self.collaborator.create_thread(&file_id, mode).await?;
        info!(job_id = %job_id, thread_id = %thread_id, "Created thread");

        let snapshots = self.collaborator.start_run(&thread_id).await?;
        let text = last_snapshot(snapshots).await?;

        if text.is_empty() {
            warn!(job_id = %job_id, "Run finished without any text");
        }
        Ok(text)
    }
}

/// Drain a snapshot stream, keeping only the most recent cumulative value
///
/// A run that emits nothing yields an empty response.
pub async fn last_snapshot(mut snapshots: SnapshotStream) -> Result<String, CollaboratorError> {
    let mut latest = String::new();
    while let Some(snapshot) = snapshots.next().await {
        latest = snapshot?;
        debug!(chars = latest.len(), "Received snapshot");
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProcessingMode;
    use crate::port::artifact_store::mocks::InMemoryArtifactStore;
    use crate::port::collaborator::mocks::{MockBehavior, MockCollaborator};
    use futures::stream;

    async fn setup(
        behavior: MockBehavior,
        mime: &str,
        name: &str,
    ) -> (ArtifactProcessor, Arc<MockCollaborator>, ArtifactPayload) {
        let collaborator = Arc::new(MockCollaborator::new(behavior));
        let store = Arc::new(InMemoryArtifactStore::new());
        let path = store.save(name, b"bytes").await.unwrap();
        let processor = ArtifactProcessor::new(
            collaborator.clone(),
            store,
            Duration::from_millis(200),
        );
        (processor, collaborator, ArtifactPayload::new(path, mime, name))
    }

    #[tokio::test]
    async fn test_keeps_last_snapshot() {
        let (processor, collaborator, payload) = setup(
            MockBehavior::Reply(vec!["a".into(), "a c".into(), "a cat".into()]),
            "image/png",
            "a.png",
        )
        .await;

        let text = processor.process(&"j1".to_string(), &payload).await.unwrap();
        assert_eq!(text, "a cat");
        assert_eq!(collaborator.modes(), vec![ProcessingMode::Vision]);
    }

    #[tokio::test]
    async fn test_document_mode_for_pdf() {
        let (processor, collaborator, payload) =
            setup(MockBehavior::EchoName, "application/pdf", "doc.pdf").await;

        let text = processor.process(&"j1".to_string(), &payload).await.unwrap();
        assert_eq!(text, "analysis of doc.pdf");
        assert_eq!(collaborator.modes(), vec![ProcessingMode::Document]);
    }

    #[tokio::test]
    async fn test_stream_error_discards_partial_text() {
        let (processor, _, payload) = setup(
            MockBehavior::FailMidStream(vec!["partial".into()], "connection reset".into()),
            "text/plain",
            "notes.txt",
        )
        .await;

        let err = processor.process(&"j1".to_string(), &payload).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Stream(_)));
    }

    async fn failure_of(behavior: MockBehavior) -> CollaboratorError {
        let (processor, _, payload) = setup(behavior, "application/pdf", "doc.pdf").await;
        processor.process(&"j1".to_string(), &payload).await.unwrap_err()
    }

    #[tokio::test]
    async fn test_each_step_failure_is_reported() {
        assert!(matches!(
            failure_of(MockBehavior::FailUpload("quota".into())).await,
            CollaboratorError::Upload(_)
        ));
        assert!(matches!(
            failure_of(MockBehavior::FailThread("bad file".into())).await,
            CollaboratorError::Thread(_)
        ));
        assert!(matches!(
            failure_of(MockBehavior::FailRun("assistant missing".into())).await,
            CollaboratorError::Run(_)
        ));
    }

    #[tokio::test]
    async fn test_hanging_run_times_out() {
        let (processor, _, payload) = setup(MockBehavior::Hang, "image/png", "a.png").await;
        let err = processor.process(&"j1".to_string(), &payload).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_before_upload() {
        let (processor, collaborator, mut payload) =
            setup(MockBehavior::EchoName, "image/png", "a.png").await;
        payload.path = "mem://missing".to_string();

        let err = processor.process(&"j1".to_string(), &payload).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Artifact(_)));
        assert_eq!(collaborator.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_stream_yields_empty_text() {
        let text = last_snapshot(stream::empty().boxed()).await.unwrap();
        assert_eq!(text, "");
    }
}
