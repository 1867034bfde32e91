// Port Layer - Interfaces for external dependencies

pub mod artifact_store;
pub mod collaborator;
pub mod id_provider; // For deterministic testing
pub mod job_queue;
pub mod maintenance;
pub mod result_store;
pub mod time_provider;

// Re-exports
pub use artifact_store::{ArtifactStore, CleanupError};
pub use collaborator::{Collaborator, CollaboratorError, RemoteFileId, SnapshotStream, ThreadId};
pub use id_provider::IdProvider;
pub use job_queue::JobQueue;
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use result_store::ResultStore;
pub use time_provider::TimeProvider;
