// Application Layer - Use Cases and Business Logic

pub mod maintenance;
pub mod processing;
pub mod recovery;
pub mod retry;
pub mod status;
pub mod submission;
pub mod worker;

// Re-exports
pub use maintenance::MaintenanceScheduler;
pub use processing::ArtifactProcessor;
pub use recovery::LeaseRecovery;
pub use retry::{RetryDecision, RetryPolicy};
pub use status::{PollOutcome, StatusService};
pub use submission::{SubmissionMode, SubmissionService, SubmitOutcome};
pub use worker::{
    shutdown_channel, JobOutcome, ShutdownSender, ShutdownToken, Worker, WorkerPool,
    WorkerSettings,
};
