//! Full-stack harness: SQLite file, artifact dir, worker pool and HTTP gateway
#![allow(dead_code)]

pub mod fake_openai;

use parcel_api_http::{AppState, HttpServer, HttpServerConfig};
use parcel_core::application::worker::constants::{DEFAULT_QUEUE, INLINE_QUEUE};
use parcel_core::application::{
    shutdown_channel, ArtifactProcessor, LeaseRecovery, RetryPolicy, ShutdownSender,
    StatusService, SubmissionMode, SubmissionService, Worker, WorkerPool, WorkerSettings,
};
use parcel_core::port::id_provider::UuidProvider;
use parcel_core::port::time_provider::SystemTimeProvider;
use parcel_core::port::{ArtifactStore, Collaborator, JobQueue, ResultStore, TimeProvider};
use parcel_infra_sqlite::{create_pool, run_migrations, SqliteJobQueue, SqlitePool, SqliteResultStore};
use parcel_infra_system::LocalArtifactStore;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct StackOptions {
    pub workers: usize,
    pub mode: SubmissionMode,
    pub max_attempts: i32,
    pub lease_ms: i64,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            mode: SubmissionMode::Queued,
            max_attempts: 1,
            lease_ms: 60_000,
        }
    }
}

pub fn database_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("parcel.db").display())
}

pub fn upload_dir(dir: &Path) -> PathBuf {
    dir.join("uploads")
}

pub struct Stack {
    pub base_url: String,
    pub pool: SqlitePool,
    pub job_queue: Arc<SqliteJobQueue>,
    pub upload_dir: PathBuf,
    shutdown: ShutdownSender,
    tasks: Vec<JoinHandle<()>>,
}

impl Stack {
    /// Start a gateway (and `options.workers` pool workers) over `data_dir`
    pub async fn start(data_dir: &Path, collaborator: Arc<dyn Collaborator>, options: StackOptions) -> Self {
        let pool = create_pool(&database_url(data_dir)).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let clock: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let job_queue = Arc::new(SqliteJobQueue::new(pool.clone(), clock.clone()));
        let results: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(pool.clone(), clock.clone()));
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(LocalArtifactStore::new(upload_dir(data_dir)).await.unwrap());
        let processor = Arc::new(ArtifactProcessor::new(
            collaborator,
            artifacts.clone(),
            Duration::from_secs(10),
        ));
        let retry = Arc::new(RetryPolicy::new(clock.clone(), 0, 2.0));
        let worker_for = |queue: &str| {
            Arc::new(Worker::new(
                WorkerSettings {
                    queue: queue.to_string(),
                    lease_ms: options.lease_ms,
                },
                job_queue.clone(),
                results.clone(),
                artifacts.clone(),
                processor.clone(),
                retry.clone(),
                clock.clone(),
            ))
        };

        let recovery = Arc::new(LeaseRecovery::new(
            job_queue.clone(),
            results.clone(),
            artifacts.clone(),
            clock.clone(),
        ));
        recovery.recover_expired_leases().await.unwrap();

        let mut submission = SubmissionService::new(
            job_queue.clone(),
            artifacts.clone(),
            Arc::new(UuidProvider),
            clock.clone(),
        )
        .with_max_attempts(options.max_attempts);
        if options.mode == SubmissionMode::Synchronous {
            submission = submission.with_inline_worker(worker_for(INLINE_QUEUE));
        }
        let status = StatusService::new(job_queue.clone(), results.clone());

        let (shutdown, token) = shutdown_channel();
        let mut tasks = Vec::new();

        if options.workers > 0 {
            let workers = WorkerPool::new(worker_for(DEFAULT_QUEUE), options.workers).with_recovery(recovery);
            let token = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                workers.run(token).await.unwrap();
            }));
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = HttpServer::new(
            HttpServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                ..Default::default()
            },
            AppState::new(Arc::new(submission), Arc::new(status)),
        );
        tasks.push(tokio::spawn(async move {
            server.serve_on(listener, token).await.unwrap();
        }));

        Self {
            base_url,
            pool,
            job_queue,
            upload_dir: upload_dir(data_dir),
            shutdown,
            tasks,
        }
    }

    /// Stop everything and release the database
    pub async fn stop(self) {
        self.shutdown.shutdown();
        for task in self.tasks {
            tokio::time::timeout(Duration::from_secs(10), task)
                .await
                .expect("stack did not stop")
                .unwrap();
        }
        self.pool.close().await;
    }

    pub fn stored_artifacts(&self) -> usize {
        std::fs::read_dir(&self.upload_dir).unwrap().count()
    }

    pub async fn job_state(&self, job_id: &str) -> Option<parcel_core::domain::JobState> {
        self.job_queue.get_state(&job_id.to_string()).await.unwrap()
    }
}

/// Thin HTTP client for the gateway
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(stack: &Stack) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: stack.base_url.clone(),
        }
    }

    pub async fn upload(&self, file_name: &str, mime: &str, bytes: &[u8]) -> (u16, Value) {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime)
            .unwrap();
        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(reqwest::multipart::Form::new().part("file", part))
            .send()
            .await
            .unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    /// Upload and return the job id of a queued submission
    pub async fn submit(&self, file_name: &str, mime: &str, bytes: &[u8]) -> String {
        let (status, body) = self.upload(file_name, mime, bytes).await;
        assert_eq!(status, 202, "unexpected upload answer {}", body);
        body["jobId"].as_str().unwrap().to_string()
    }

    pub async fn poll(&self, job_id: &str) -> (u16, Value) {
        let response = self
            .http
            .get(format!("{}/result/{}", self.base_url, job_id))
            .send()
            .await
            .unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    /// Poll until the job is completed or failed
    pub async fn wait(&self, job_id: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
        loop {
            let (status, body) = self.poll(job_id).await;
            assert_eq!(status, 200, "poll failed: {}", body);
            if body["status"] == "completed" || body["status"] == "failed" {
                return body;
            }
            assert!(tokio::time::Instant::now() < deadline, "job {} never finished", job_id);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
