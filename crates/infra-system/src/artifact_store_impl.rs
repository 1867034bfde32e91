// Local filesystem artifact store
use async_trait::async_trait;
use parcel_core::port::{ArtifactStore, CleanupError};
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};

/// Longest sanitized file name kept in the stored name
const MAX_NAME_LEN: usize = 100;

/// Stores each upload as `{root}/{uuid}-{sanitized name}`
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    /// Create the store, creating `root` if needed
    pub async fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "Artifact store ready");
        Ok(Self { root })
    }

    /// Only paths directly under the root are ever read or deleted
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let candidate = PathBuf::from(path);
        match candidate.parent() {
            Some(parent) if parent == self.root => Ok(candidate),
            _ => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is outside the artifact root", path),
            )),
        }
    }
}

/// Keep the original name readable while dropping path separators and
/// anything a shell or filesystem might object to
fn sanitize_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn save(&self, original_name: &str, bytes: &[u8]) -> io::Result<String> {
        let file_name = format!("{}-{}", uuid::Uuid::new_v4(), sanitize_name(original_name));
        let final_path = self.root.join(&file_name);
        let partial_path = self.root.join(format!(".{}.part", file_name));

        // Write then rename so a reader never sees a half-written file
        tokio::fs::write(&partial_path, bytes).await?;
        tokio::fs::rename(&partial_path, &final_path).await?;

        debug!(path = %final_path.display(), bytes = bytes.len(), "Stored artifact");
        Ok(final_path.to_string_lossy().into_owned())
    }

    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.resolve(path)?).await
    }

    async fn remove(&self, path: &str) -> Result<(), CleanupError> {
        let resolved = self.resolve(path).map_err(|e| CleanupError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        match tokio::fs::remove_file(&resolved).await {
            Ok(()) => {
                debug!(path = %path, "Deleted artifact");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CleanupError::Missing(path.to_string()))
            }
            Err(e) => Err(CleanupError::Io {
                path: path.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(resolved) => tokio::fs::try_exists(resolved).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}
