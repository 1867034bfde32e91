// Artifact Store Port
// Uploaded files live here between submission and the job's terminal transition

use async_trait::async_trait;
use thiserror::Error;

/// Failure to release an artifact. Logged by the worker, never fatal to job state.
#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("Artifact already gone: {0}")]
    Missing(String),

    #[error("Failed to delete artifact {path}: {reason}")]
    Io { path: String, reason: String },
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist uploaded bytes; returns the locator stored in the job payload
    async fn save(&self, original_name: &str, bytes: &[u8]) -> std::io::Result<String>;

    /// Read the artifact for upload to the collaborator
    async fn read(&self, path: &str) -> std::io::Result<Vec<u8>>;

    /// Delete the artifact
    async fn remove(&self, path: &str) -> Result<(), CleanupError>;

    async fn exists(&self, path: &str) -> bool;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory artifact store that counts deletions
    #[derive(Default)]
    pub struct InMemoryArtifactStore {
        files: Mutex<HashMap<String, Vec<u8>>>,
        next: AtomicUsize,
        removals: AtomicUsize,
        fail_removals: AtomicBool,
    }

    impl InMemoryArtifactStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make `remove` report an I/O error (file is kept)
        pub fn set_fail_removals(&self, fail: bool) {
            self.fail_removals.store(fail, Ordering::SeqCst);
        }

        /// Number of successful or attempted deletions
        pub fn removal_count(&self) -> usize {
            self.removals.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArtifactStore for InMemoryArtifactStore {
        async fn save(&self, original_name: &str, bytes: &[u8]) -> std::io::Result<String> {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            let path = format!("mem://{}/{}", n, original_name);
            self.files
                .lock()
                .unwrap()
                .insert(path.clone(), bytes.to_vec());
            Ok(path)
        }

        async fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
        }

        async fn remove(&self, path: &str) -> Result<(), CleanupError> {
            self.removals.fetch_add(1, Ordering::SeqCst);
            if self.fail_removals.load(Ordering::SeqCst) {
                return Err(CleanupError::Io {
                    path: path.to_string(),
                    reason: "permission denied".to_string(),
                });
            }
            match self.files.lock().unwrap().remove(path) {
                Some(_) => Ok(()),
                None => Err(CleanupError::Missing(path.to_string())),
            }
        }

        async fn exists(&self, path: &str) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }
    }
}
