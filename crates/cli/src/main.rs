//! Parcel CLI - upload artifacts and fetch their analysis

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tabled::{Table, Tabled};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

#[derive(Parser)]
#[command(name = "parcel")]
#[command(about = "Parcel analysis queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Gateway URL
    #[arg(long, env = "PARCEL_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file for analysis
    Upload {
        /// File to upload
        file: PathBuf,
    },

    /// Show the status (and result) of a job
    Result {
        /// Job ID
        job_id: String,
    },

    /// Poll a job until it completes or fails
    Wait {
        /// Job ID
        job_id: String,

        /// Delay between polls
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Give up after this long
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
    },
}

/// Body of any gateway answer; fields depend on the endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayResponse {
    job_id: Option<String>,
    status: Option<String>,
    result: Option<String>,
    reason: Option<String>,
    error: Option<String>,
}

impl GatewayResponse {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_deref(), Some("completed") | Some("failed"))
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Job")]
    job_id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

struct Gateway {
    client: Client,
    base_url: String,
}

impl Gateway {
    fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn upload(&self, path: &Path) -> Result<(StatusCode, GatewayResponse)> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(path))?;
        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .context("Failed to connect to gateway")?;
        read_body(response).await
    }

    async fn result(&self, job_id: &str) -> Result<(StatusCode, GatewayResponse)> {
        let response = self
            .client
            .get(format!("{}/result/{}", self.base_url, job_id))
            .send()
            .await
            .context("Failed to connect to gateway")?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<(StatusCode, GatewayResponse)> {
    let status = response.status();
    let body = response
        .json::<GatewayResponse>()
        .await
        .context("Failed to parse response")?;
    Ok((status, body))
}

/// Content type from the file extension
fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

fn status_row(job_id: &str, body: &GatewayResponse) -> StatusRow {
    let detail = body
        .result
        .clone()
        .or_else(|| body.reason.clone())
        .unwrap_or_default();
    StatusRow {
        job_id: job_id.to_string(),
        status: body.status.clone().unwrap_or_else(|| "unknown".to_string()),
        detail,
    }
}

fn print_status(job_id: &str, body: &GatewayResponse) {
    let headline = match body.status.as_deref() {
        Some("completed") => "✓ Job completed".green().bold(),
        Some("failed") => "✗ Job failed".red().bold(),
        _ => "… Job in progress".yellow().bold(),
    };
    println!("{}", headline);
    println!();
    println!("{}", Table::new(vec![status_row(job_id, body)]));
}

/// Turn an error answer into an error, keeping the gateway's message
fn expect_success(status: StatusCode, body: &GatewayResponse) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = body.error.clone().unwrap_or_else(|| status.to_string());
    match &body.job_id {
        Some(job_id) => bail!("{} (job {})", message, job_id),
        None => bail!("{}", message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let gateway = Gateway::new(&cli.server_url);

    match cli.command {
        Commands::Upload { file } => {
            let (status, body) = gateway.upload(&file).await?;
            expect_success(status, &body)?;
            let job_id = body.job_id.clone().context("Gateway answered without a job id")?;

            if status == StatusCode::ACCEPTED {
                println!("{}", "✓ File queued for analysis".green().bold());
                println!("  {} {}", "Job ID:".bold(), job_id);
            } else {
                print_status(&job_id, &body);
            }
        }

        Commands::Result { job_id } => {
            let (status, body) = gateway.result(&job_id).await?;
            expect_success(status, &body)?;
            print_status(&job_id, &body);
        }

        Commands::Wait {
            job_id,
            interval_ms,
            timeout_secs,
        } => {
            let deadline = Instant::now() + Duration::from_secs(timeout_secs);
            loop {
                let (status, body) = gateway.result(&job_id).await?;
                expect_success(status, &body)?;
                if body.is_terminal() {
                    print_status(&job_id, &body);
                    if body.status.as_deref() == Some("failed") {
                        std::process::exit(1);
                    }
                    break;
                }
                if Instant::now() >= deadline {
                    bail!("Timed out after {}s waiting for job {}", timeout_secs, job_id);
                }
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }
        }
    }

    Ok(())
}
