// Job Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::artifact::ArtifactPayload;
use crate::domain::error::{DomainError, Result};

/// Job ID (UUID v4)
pub type JobId = String;

/// Queue identifier
pub type QueueId = String;

/// Job State
///
/// Forward only: `Waiting -> Active -> {Completed | Failed}`.
/// `Active -> Waiting` is the retry/lease requeue edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: QueueId,
    pub state: JobState,
    pub payload: ArtifactPayload,

    // Attempt bookkeeping
    pub attempts: i32,
    pub max_attempts: i32,

    pub created_at: i64, // epoch ms
    pub available_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,

    // Claim lease (set while Active)
    pub lease_expires_at: Option<i64>,

    pub last_error: Option<String>,
}

impl Job {
    /// Create a new Job in `Waiting` state
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `queue` - Queue name
    /// * `payload` - Uploaded artifact
    /// * `max_attempts` - Attempt budget (1 = no automatic retry)
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        queue: impl Into<String>,
        payload: ArtifactPayload,
        max_attempts: i32,
    ) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            state: JobState::Waiting,
            payload,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            created_at,
            available_at: created_at,
            started_at: None,
            finished_at: None,
            lease_expires_at: None,
            last_error: None,
        }
    }

    /// Claim: `Waiting -> Active`, counts the attempt and takes the lease
    pub fn start(&mut self, now_millis: i64, lease_ms: i64) -> Result<()> {
        self.transition(JobState::Waiting, JobState::Active)?;
        self.attempts += 1;
        self.started_at.get_or_insert(now_millis);
        self.lease_expires_at = Some(now_millis + lease_ms);
        Ok(())
    }

    /// `Active -> Completed`
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobState::Active, JobState::Completed)?;
        self.finished_at.get_or_insert(now_millis);
        self.lease_expires_at = None;
        Ok(())
    }

    /// `Active -> Failed`
    pub fn fail(&mut self, now_millis: i64, reason: impl Into<String>) -> Result<()> {
        self.transition(JobState::Active, JobState::Failed)?;
        self.finished_at.get_or_insert(now_millis);
        self.lease_expires_at = None;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// `Active -> Waiting` for another attempt, claimable from `available_at`
    pub fn requeue(&mut self, available_at: i64, reason: impl Into<String>) -> Result<()> {
        self.transition(JobState::Active, JobState::Waiting)?;
        self.available_at = available_at;
        self.lease_expires_at = None;
        self.last_error = Some(reason.into());
        Ok(())
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn is_lease_expired(&self, now_millis: i64) -> bool {
        self.state == JobState::Active
            && self.lease_expires_at.is_some_and(|deadline| deadline <= now_millis)
    }

    fn transition(&mut self, expected: JobState, to: JobState) -> Result<()> {
        if self.state != expected {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}
