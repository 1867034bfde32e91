// Artifact Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Uploaded artifact referenced by a job.
///
/// The file at `path` is owned by the job and is deleted on its terminal
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    pub path: String,
    pub mime_type: String,
    pub original_name: String,
}

impl ArtifactPayload {
    pub fn new(
        path: impl Into<String>,
        mime_type: impl Into<String>,
        original_name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.into(),
            original_name: original_name.into(),
        }
    }

    /// Reject payloads a worker could never process
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(DomainError::InvalidArtifact(
                "artifact path is empty".to_string(),
            ));
        }
        if self.original_name.trim().is_empty() {
            return Err(DomainError::InvalidArtifact(
                "original name is empty".to_string(),
            ));
        }
        if !self.mime_type.contains('/') {
            return Err(DomainError::InvalidArtifact(format!(
                "malformed MIME type: {:?}",
                self.mime_type
            )));
        }
        Ok(())
    }

    pub fn mode(&self) -> ProcessingMode {
        ProcessingMode::for_mime(&self.mime_type)
    }
}

/// Request shape used with the collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Image artifacts: described by the assistant
    Vision,
    /// Everything else: attached for file search
    Document,
}

impl ProcessingMode {
    /// Classify by MIME family. Anything under `image/` is vision.
    pub fn for_mime(mime_type: &str) -> Self {
        if mime_type.trim().to_ascii_lowercase().starts_with("image/") {
            ProcessingMode::Vision
        } else {
            ProcessingMode::Document
        }
    }

    /// Initial user instruction placed in the thread
    pub fn instruction(&self) -> &'static str {
        match self {
            ProcessingMode::Vision => "What is on the image? Please respond in JSON format.",
            ProcessingMode::Document => "Please process the file I have uploaded.",
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::Vision => write!(f, "vision"),
            ProcessingMode::Document => write!(f, "document"),
        }
    }
}
