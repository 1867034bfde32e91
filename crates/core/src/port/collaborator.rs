// Collaborator Port
// Narrow contract with the external assistant service: upload a file,
// open a thread around it, run the assistant and read back text snapshots

use crate::domain::ProcessingMode;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// File id issued by the collaborator
pub type RemoteFileId = String;

/// Conversational context id issued by the collaborator
pub type ThreadId = String;

/// Finite, non-restartable sequence of cumulative text snapshots.
///
/// Each item is the full response so far; the last `Ok` item is the answer.
pub type SnapshotStream = BoxStream<'static, Result<String, CollaboratorError>>;

/// Collaborator errors: every variant ends the attempt as failed
#[derive(Error, Debug, Clone)]
pub enum CollaboratorError {
    #[error("Artifact unreadable: {0}")]
    Artifact(String),

    #[error("File upload failed: {0}")]
    Upload(String),

    #[error("Thread creation failed: {0}")]
    Thread(String),

    #[error("Run failed: {0}")]
    Run(String),

    #[error("Response stream broken: {0}")]
    Stream(String),

    #[error("Collaborator round trip timed out after {0}s")]
    Timeout(u64),

    #[error("Collaborator task panicked: {0}")]
    Panicked(String),
}

#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Step 1: upload the artifact with the request shape of `mode`
    async fn upload_file(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        mode: ProcessingMode,
    ) -> Result<RemoteFileId, CollaboratorError>;

    /// Step 2: open a thread carrying the file and the mode's instruction
    async fn create_thread(
        &self,
        file_id: &RemoteFileId,
        mode: ProcessingMode,
    ) -> Result<ThreadId, CollaboratorError>;

    /// Step 3: start a run and hand back its snapshot stream
    async fn start_run(&self, thread_id: &ThreadId) -> Result<SnapshotStream, CollaboratorError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use futures::stream::{self, StreamExt};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Mock collaborator behavior, chosen per upload
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Stream these snapshots, then finish
        Reply(Vec<String>),
        /// Reply with "analysis of {file name}"
        EchoName,
        FailUpload(String),
        FailThread(String),
        FailRun(String),
        /// Stream these snapshots, then break
        FailMidStream(Vec<String>, String),
        /// Reply with the text after a pause
        Delayed(std::time::Duration, String),
        /// Never produce anything (timeout testing)
        Hang,
        /// Panic inside the run (panic isolation testing)
        Panic(String),
    }

    /// Scripted collaborator. Each upload pops the next behavior; the last one repeats.
    pub struct MockCollaborator {
        script: Mutex<VecDeque<MockBehavior>>,
        files: Mutex<HashMap<RemoteFileId, (String, MockBehavior)>>,
        threads: Mutex<HashMap<ThreadId, RemoteFileId>>,
        modes: Mutex<Vec<ProcessingMode>>,
    }

    impl MockCollaborator {
        pub fn new(behavior: MockBehavior) -> Self {
            Self::with_script(vec![behavior])
        }

        pub fn with_script(script: Vec<MockBehavior>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                files: Mutex::new(HashMap::new()),
                threads: Mutex::new(HashMap::new()),
                modes: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: impl Into<String>) -> Self {
            Self::new(MockBehavior::Reply(vec![text.into()]))
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::FailRun(message.into()))
        }

        /// Modes seen by `upload_file`, in call order
        pub fn modes(&self) -> Vec<ProcessingMode> {
            self.modes.lock().unwrap().clone()
        }

        pub fn upload_count(&self) -> usize {
            self.modes.lock().unwrap().len()
        }

        fn next_behavior(&self) -> MockBehavior {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap_or(MockBehavior::EchoName)
            } else {
                script.front().cloned().unwrap_or(MockBehavior::EchoName)
            }
        }

        fn behavior_for_thread(&self, thread_id: &ThreadId) -> Option<(String, MockBehavior)> {
            let file_id = self.threads.lock().unwrap().get(thread_id).cloned()?;
            self.files.lock().unwrap().get(&file_id).cloned()
        }
    }

    #[async_trait]
    impl Collaborator for MockCollaborator {
        async fn upload_file(
            &self,
            file_name: &str,
            _mime_type: &str,
            _bytes: Vec<u8>,
            mode: ProcessingMode,
        ) -> Result<RemoteFileId, CollaboratorError> {
            self.modes.lock().unwrap().push(mode);
            let behavior = self.next_behavior();
            if let MockBehavior::FailUpload(msg) = &behavior {
                return Err(CollaboratorError::Upload(msg.clone()));
            }
            let mut files = self.files.lock().unwrap();
            let file_id = format!("file-{}", files.len() + 1);
            files.insert(file_id.clone(), (file_name.to_string(), behavior));
            Ok(file_id)
        }

        async fn create_thread(
            &self,
            file_id: &RemoteFileId,
            _mode: ProcessingMode,
        ) -> Result<ThreadId, CollaboratorError> {
            let behavior = self
                .files
                .lock()
                .unwrap()
                .get(file_id)
                .map(|(_, b)| b.clone())
                .ok_or_else(|| CollaboratorError::Thread(format!("unknown file {}", file_id)))?;
            if let MockBehavior::FailThread(msg) = behavior {
                return Err(CollaboratorError::Thread(msg));
            }
            let mut threads = self.threads.lock().unwrap();
            let thread_id = format!("thread-{}", threads.len() + 1);
            threads.insert(thread_id.clone(), file_id.clone());
            Ok(thread_id)
        }

        async fn start_run(&self, thread_id: &ThreadId) -> Result<SnapshotStream, CollaboratorError> {
            let (file_name, behavior) = self
                .behavior_for_thread(thread_id)
                .ok_or_else(|| CollaboratorError::Run(format!("unknown thread {}", thread_id)))?;

            match behavior {
                MockBehavior::Reply(snapshots) => {
                    Ok(stream::iter(snapshots.into_iter().map(Ok)).boxed())
                }
                MockBehavior::EchoName => {
                    let text = format!("analysis of {}", file_name);
                    Ok(stream::iter(vec![Ok(text)]).boxed())
                }
                MockBehavior::FailRun(msg) => Err(CollaboratorError::Run(msg)),
                MockBehavior::FailMidStream(snapshots, msg) => {
                    let items = snapshots
                        .into_iter()
                        .map(Ok)
                        .chain(std::iter::once(Err(CollaboratorError::Stream(msg))));
                    Ok(stream::iter(items).boxed())
                }
                MockBehavior::Delayed(pause, text) => Ok(stream::once(async move {
                    tokio::time::sleep(pause).await;
                    Ok(text)
                })
                .boxed()),
                MockBehavior::Hang => Ok(stream::pending().boxed()),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg);
                }
                // Rejected earlier in the protocol
                MockBehavior::FailUpload(msg) | MockBehavior::FailThread(msg) => {
                    Err(CollaboratorError::Run(msg))
                }
            }
        }
    }
}
