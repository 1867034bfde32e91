//! Daemon configuration from the environment
//!
//! `.env` is honored; `~` in paths and the database URL is expanded.

use crate::telemetry::{LogConfig, LogFormat};
use anyhow::{anyhow, bail, Result};
use parcel_api_http::HttpServerConfig;
use parcel_core::application::worker::constants::{
    DEFAULT_COLLABORATOR_TIMEOUT, DEFAULT_LEASE_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_BASE_DELAY_MS,
};
use parcel_core::application::SubmissionMode;
use parcel_core::port::MaintenanceConfig;
use parcel_infra_openai::{OpenAiConfig, DEFAULT_BASE_URL};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://~/.parcel/parcel.db";
const DEFAULT_UPLOAD_DIR: &str = "~/.parcel/uploads";
const DEFAULT_WORKERS: usize = 1;
const DEFAULT_MAX_UPLOAD_MB: usize = 25;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub openai: OpenAiConfig,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub http: HttpServerConfig,
    pub workers: usize,
    pub max_attempts: i32,
    pub retry_base_delay_ms: i64,
    pub lease: Duration,
    pub collaborator_timeout: Duration,
    pub submission_mode: SubmissionMode,
    pub maintenance: MaintenanceConfig,
    pub log: LogConfig,
}

impl DaemonConfig {
    /// Load `.env` (if any) and read the process environment
    pub fn from_env() -> Result<Self> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or_else(|| anyhow!("OPENAI_API_KEY is required"))?;
        let assistant_id =
            get("OPENAI_ASSISTANT_ID").ok_or_else(|| anyhow!("OPENAI_ASSISTANT_ID is required"))?;
        let openai = OpenAiConfig::new(api_key, assistant_id)
            .with_base_url(get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()));

        let database_url = expand(&get("PARCEL_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()));
        let upload_dir = PathBuf::from(expand(
            &get("PARCEL_UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
        ));

        let defaults = HttpServerConfig::default();
        let max_upload_mb: usize = parse(&get, "PARCEL_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB)?;
        let http = HttpServerConfig {
            host: get("PARCEL_HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT", defaults.port)?,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        };

        let retention_days: i64 = parse(&get, "PARCEL_RETENTION_DAYS", 7)?;
        let maintenance = MaintenanceConfig {
            finished_job_retention_days: retention_days,
            result_retention_days: retention_days,
            ..MaintenanceConfig::default()
        };

        let log = LogConfig {
            format: parse(&get, "PARCEL_LOG_FORMAT", LogFormat::Pretty)?,
            dir: get("PARCEL_LOG_DIR").map(|d| PathBuf::from(expand(&d))),
        };

        let config = Self {
            openai,
            database_url,
            upload_dir,
            http,
            workers: parse(&get, "PARCEL_WORKERS", DEFAULT_WORKERS)?,
            max_attempts: parse(&get, "PARCEL_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            retry_base_delay_ms: parse(&get, "PARCEL_RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS)?,
            lease: Duration::from_secs(parse(
                &get,
                "PARCEL_LEASE_SECS",
                (DEFAULT_LEASE_MS / 1000) as u64,
            )?),
            collaborator_timeout: Duration::from_secs(parse(
                &get,
                "PARCEL_COLLABORATOR_TIMEOUT_SECS",
                DEFAULT_COLLABORATOR_TIMEOUT.as_secs(),
            )?),
            submission_mode: parse(&get, "PARCEL_SUBMISSION_MODE", SubmissionMode::Queued)?,
            maintenance,
            log,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("PARCEL_WORKERS must be at least 1");
        }
        if self.max_attempts < 1 {
            bail!("PARCEL_MAX_ATTEMPTS must be at least 1");
        }
        if self.retry_base_delay_ms < 0 {
            bail!("PARCEL_RETRY_BASE_DELAY_MS must not be negative");
        }
        if self.lease <= self.collaborator_timeout {
            bail!(
                "PARCEL_LEASE_SECS ({}) must exceed PARCEL_COLLABORATOR_TIMEOUT_SECS ({})",
                self.lease.as_secs(),
                self.collaborator_timeout.as_secs()
            );
        }
        if self.maintenance.finished_job_retention_days < 1 {
            bail!("PARCEL_RETENTION_DAYS must be at least 1");
        }
        Ok(())
    }

    pub fn lease_ms(&self) -> i64 {
        self.lease.as_millis() as i64
    }

    /// Database file for a file-backed SQLite URL; `None` for in-memory
    pub fn database_path(&self) -> Option<PathBuf> {
        let rest = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or(rest);
        if path.is_empty() || path.contains(":memory:") {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

fn expand(raw: &str) -> String {
    shellexpand::tilde(raw).into_owned()
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
    }
}
