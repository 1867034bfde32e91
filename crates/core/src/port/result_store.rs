// Result Store Port (Interface)

use crate::domain::JobId;
use crate::error::Result;
use async_trait::async_trait;

/// Durable job id -> final result text
///
/// Presence of a value is proof that the job completed.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Upsert. In normal operation only the job's own worker attempt writes.
    async fn put(&self, id: &JobId, value: &str) -> Result<()>;

    async fn get(&self, id: &JobId) -> Result<Option<String>>;

    /// Delete results stored before `cutoff_millis`, returns how many went
    async fn purge_before(&self, cutoff_millis: i64) -> Result<u64>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory result store; `fail_writes` simulates a store outage
    #[derive(Default)]
    pub struct InMemoryResultStore {
        values: Mutex<HashMap<JobId, (String, i64)>>,
        fail_writes: AtomicBool,
    }

    impl InMemoryResultStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ResultStore for InMemoryResultStore {
        async fn put(&self, id: &JobId, value: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Database("result store unavailable".to_string()));
            }
            let stored_at = chrono::Utc::now().timestamp_millis();
            self.values
                .lock()
                .unwrap()
                .insert(id.clone(), (value.to_string(), stored_at));
            Ok(())
        }

        async fn get(&self, id: &JobId) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(id).map(|(v, _)| v.clone()))
        }

        async fn purge_before(&self, cutoff_millis: i64) -> Result<u64> {
            let mut values = self.values.lock().unwrap();
            let before = values.len();
            values.retain(|_, (_, stored_at)| *stored_at >= cutoff_millis);
            Ok((before - values.len()) as u64)
        }
    }
}
