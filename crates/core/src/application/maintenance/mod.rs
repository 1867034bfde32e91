// Maintenance Service
// Scheduled retention and compaction of the job/result store

use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::{Maintenance, MaintenanceConfig, MaintenanceStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Default cadence (24 hours)
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Maintenance scheduler
///
/// Runs periodic maintenance operations (GC, VACUUM) in the background
pub struct MaintenanceScheduler {
    maintenance: Arc<dyn Maintenance>,
    config: MaintenanceConfig,
    every: Duration,
}

impl MaintenanceScheduler {
    /// # Arguments
    /// * `maintenance` - Maintenance implementation
    /// * `config` - Retention configuration
    /// * `every` - How often to run maintenance
    pub fn new(maintenance: Arc<dyn Maintenance>, config: MaintenanceConfig, every: Duration) -> Self {
        Self {
            maintenance,
            config,
            every,
        }
    }

    /// Run maintenance loop (background task)
    ///
    /// The first tick fires immediately, so a restart also sweeps.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.every.as_secs(),
            job_retention_days = self.config.finished_job_retention_days,
            result_retention_days = self.config.result_retention_days,
            "Maintenance scheduler started"
        );

        let mut tick = interval(self.every);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_now().await {
                        error!(error = ?e, "Scheduled maintenance failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        info!("Maintenance scheduler stopped");
    }

    /// Run maintenance immediately
    pub async fn run_now(&self) -> Result<MaintenanceStats> {
        let stats = self.maintenance.run_full_maintenance(&self.config).await?;
        info!(
            db_size_mb = stats.db_size_mb,
            job_count = stats.job_count,
            finished_jobs = stats.finished_job_count,
            results = stats.result_count,
            "Maintenance pass finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::shutdown_channel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMaintenance {
        gc_calls: Mutex<Vec<(&'static str, i64)>>,
        vacuums: AtomicUsize,
        size_mb: f64,
    }

    #[async_trait]
    impl Maintenance for RecordingMaintenance {
        async fn vacuum(&self) -> Result<f64> {
            self.vacuums.fetch_add(1, Ordering::SeqCst);
            Ok(1.0)
        }

        async fn gc_finished_jobs(&self, retention_days: i64) -> Result<i64> {
            self.gc_calls.lock().unwrap().push(("jobs", retention_days));
            Ok(2)
        }

        async fn gc_results(&self, retention_days: i64) -> Result<i64> {
            self.gc_calls.lock().unwrap().push(("results", retention_days));
            Ok(3)
        }

        async fn get_stats(&self) -> Result<MaintenanceStats> {
            Ok(MaintenanceStats {
                db_size_mb: self.size_mb,
                db_size_bytes: (self.size_mb * 1024.0 * 1024.0) as i64,
                job_count: 0,
                finished_job_count: 0,
                result_count: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_run_now_applies_retention() {
        let maintenance = Arc::new(RecordingMaintenance::default());
        let scheduler = MaintenanceScheduler::new(
            maintenance.clone(),
            MaintenanceConfig::default(),
            DEFAULT_MAINTENANCE_INTERVAL,
        );

        scheduler.run_now().await.unwrap();

        assert_eq!(
            *maintenance.gc_calls.lock().unwrap(),
            vec![("jobs", 7), ("results", 7)]
        );
        // Small database, no vacuum
        assert_eq!(maintenance.vacuums.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_database_is_vacuumed() {
        let maintenance = Arc::new(RecordingMaintenance {
            size_mb: 2000.0,
            ..Default::default()
        });
        let scheduler = MaintenanceScheduler::new(
            maintenance.clone(),
            MaintenanceConfig::default(),
            DEFAULT_MAINTENANCE_INTERVAL,
        );

        scheduler.run_now().await.unwrap();
        assert_eq!(maintenance.vacuums.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loop_sweeps_on_start_and_stops_on_shutdown() {
        let maintenance = Arc::new(RecordingMaintenance::default());
        let scheduler = MaintenanceScheduler::new(
            maintenance.clone(),
            MaintenanceConfig::default(),
            DEFAULT_MAINTENANCE_INTERVAL,
        );
        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(scheduler.run(token));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while maintenance.gc_calls.lock().unwrap().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "no sweep on start");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
