// Retry logic
use crate::domain::Job;
use crate::port::TimeProvider;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::worker::constants::{DEFAULT_BACKOFF_FACTOR, DEFAULT_RETRY_BASE_DELAY_MS};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue the job, claimable again at this epoch-ms instant
    Retry { available_at: i64 },
    /// Do not retry, job has failed permanently
    Failed,
}

/// Decides what happens to a job whose attempt failed
///
/// A job is retried while `attempts < max_attempts`. With the default budget of
/// one attempt every failure is final.
pub struct RetryPolicy {
    time_provider: Arc<dyn TimeProvider>,
    base_delay_ms: i64,
    backoff_factor: f64,
}

impl RetryPolicy {
    /// # Arguments
    /// * `time_provider` - Time provider for current time
    /// * `base_delay_ms` - Delay before the second attempt
    /// * `backoff_factor` - Multiplier applied per further attempt
    pub fn new(time_provider: Arc<dyn TimeProvider>, base_delay_ms: i64, backoff_factor: f64) -> Self {
        Self {
            time_provider,
            base_delay_ms,
            backoff_factor,
        }
    }

    pub fn with_defaults(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::new(time_provider, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_BACKOFF_FACTOR)
    }

    /// Determine if a job should be retried
    ///
    /// Backoff formula:
    /// delay = base_delay * (backoff_factor ^ (attempts - 1)) * jitter
    pub fn should_retry(&self, job: &Job) -> RetryDecision {
        if !job.has_attempts_left() {
            warn!(
                job_id = %job.id,
                attempts = %job.attempts,
                max_attempts = %job.max_attempts,
                "Attempt budget spent"
            );
            return RetryDecision::Failed;
        }

        let delay_ms = self.backoff_delay_ms(job);
        let available_at = self.time_provider.now_millis() + delay_ms;

        info!(
            job_id = %job.id,
            attempt = %job.attempts,
            max_attempts = %job.max_attempts,
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry { available_at }
    }

    /// Exponential backoff with +/-10% jitter seeded by the job id, so
    /// simultaneous failures do not come back in lockstep
    pub fn backoff_delay_ms(&self, job: &Job) -> i64 {
        let exponent = (job.attempts - 1).max(0);
        let base_delay_ms = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);

        let jitter_seed = job.id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        (base_delay_ms * jitter_factor) as i64
    }
}
