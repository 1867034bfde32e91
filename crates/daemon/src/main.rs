//! Parcel server - Main Entry Point
//!
//! Composition root: HTTP gateway, worker pool, lease reaper and maintenance
//! share one SQLite database and one shutdown signal.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use config::DaemonConfig;
use parcel_api_http::{AppState, HttpServer};
use parcel_core::application::maintenance::DEFAULT_MAINTENANCE_INTERVAL;
use parcel_core::application::worker::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_QUEUE, INLINE_QUEUE,
};
use parcel_core::application::{
    shutdown_channel, ArtifactProcessor, LeaseRecovery, MaintenanceScheduler, RetryPolicy,
    StatusService, SubmissionMode, SubmissionService, Worker, WorkerPool, WorkerSettings,
};
use parcel_core::port::id_provider::UuidProvider;
use parcel_core::port::time_provider::SystemTimeProvider;
use parcel_core::port::{
    ArtifactStore, Collaborator, JobQueue, Maintenance, ResultStore, TimeProvider,
};
use parcel_infra_openai::OpenAiAssistantClient;
use parcel_infra_sqlite::{
    create_pool, run_migrations, SqliteJobQueue, SqliteMaintenance, SqliteResultStore,
};
use parcel_infra_system::LocalArtifactStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long background loops get to finish their current job
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env().context("Invalid configuration")?;
    let _telemetry = telemetry::init(&config.log)?;

    info!(
        version = VERSION,
        mode = ?config.submission_mode,
        workers = config.workers,
        "Parcel server starting"
    );

    // 2. Database
    if let Some(path) = config.database_path() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating database directory {}", parent.display()))?;
        }
    }
    info!(url = %config.database_url, "Initializing database...");
    let pool = create_pool(&config.database_url)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Ports (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let job_queue: Arc<dyn JobQueue> =
        Arc::new(SqliteJobQueue::new(pool.clone(), time_provider.clone()));
    let result_store: Arc<dyn ResultStore> =
        Arc::new(SqliteResultStore::new(pool.clone(), time_provider.clone()));
    let artifact_store: Arc<dyn ArtifactStore> = Arc::new(
        LocalArtifactStore::new(&config.upload_dir)
            .await
            .with_context(|| format!("Creating upload directory {}", config.upload_dir.display()))?,
    );
    let collaborator: Arc<dyn Collaborator> = Arc::new(
        OpenAiAssistantClient::new(config.openai.clone())
            .context("Collaborator client creation failed")?,
    );
    let maintenance: Arc<dyn Maintenance> =
        Arc::new(SqliteMaintenance::new(pool.clone(), time_provider.clone()));

    // 4. Application services
    let processor = Arc::new(ArtifactProcessor::new(
        collaborator,
        artifact_store.clone(),
        config.collaborator_timeout,
    ));
    let retry_policy = Arc::new(RetryPolicy::new(
        time_provider.clone(),
        config.retry_base_delay_ms,
        DEFAULT_BACKOFF_FACTOR,
    ));
    let worker_for = |queue: &str| {
        Arc::new(Worker::new(
            WorkerSettings {
                queue: queue.to_string(),
                lease_ms: config.lease_ms(),
            },
            job_queue.clone(),
            result_store.clone(),
            artifact_store.clone(),
            processor.clone(),
            retry_policy.clone(),
            time_provider.clone(),
        ))
    };

    // 5. Resolve claims left behind by a previous run
    let recovery = Arc::new(LeaseRecovery::new(
        job_queue.clone(),
        result_store.clone(),
        artifact_store.clone(),
        time_provider.clone(),
    ));
    match recovery.recover_expired_leases().await {
        Ok(count) => info!(recovered_jobs = count, "Startup lease recovery completed"),
        Err(e) => error!(error = %e, "Startup lease recovery failed"),
    }

    let mut submission = SubmissionService::new(
        job_queue.clone(),
        artifact_store.clone(),
        Arc::new(UuidProvider),
        time_provider.clone(),
    )
    .with_max_attempts(config.max_attempts);
    if config.submission_mode == SubmissionMode::Synchronous {
        submission = submission.with_inline_worker(worker_for(INLINE_QUEUE));
    }
    let status = StatusService::new(job_queue.clone(), result_store.clone());

    // 6. Background loops
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let shutdown_tx = Arc::new(shutdown_tx);

    let worker_pool = WorkerPool::new(worker_for(DEFAULT_QUEUE), config.workers).with_recovery(recovery);
    let pool_handle = tokio::spawn(worker_pool.run(shutdown_tx.subscribe()));

    let scheduler = MaintenanceScheduler::new(
        maintenance,
        config.maintenance.clone(),
        DEFAULT_MAINTENANCE_INTERVAL,
    );
    let maintenance_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received. Exiting gracefully...");
            shutdown_tx.shutdown();
        });
    }

    // 7. HTTP gateway (returns on shutdown or bind failure)
    info!(addr = %config.http.addr(), "System ready");
    let server = HttpServer::new(
        config.http.clone(),
        AppState::new(Arc::new(submission), Arc::new(status)),
    );
    let served = server.serve(shutdown_rx).await;

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    match tokio::time::timeout(DRAIN_TIMEOUT, pool_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "Worker pool failed"),
        Ok(Err(e)) => error!(error = %e, "Worker pool task aborted"),
        Err(_) => warn!("Worker pool did not drain in time; leases will be recovered on restart"),
    }
    if tokio::time::timeout(DRAIN_TIMEOUT, maintenance_handle).await.is_err() {
        warn!("Maintenance did not stop in time");
    }
    pool.close().await;

    served.context("HTTP server failed")?;
    info!("Shutdown complete.");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
