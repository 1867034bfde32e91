//! Logging and optional OpenTelemetry export
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default `parcel=info,tower_http=info`)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317),
//!   honored when built with the `telemetry` feature
//! - `OTEL_SERVICE_NAME`: service name (default: parcel-server)

use anyhow::Result;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "parcel=info,tower_http=info";
const LOG_FILE_NAME: &str = "parcel.log";
const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, for development
    Pretty,
    /// One JSON object per line, for production
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {:?} (expected pretty or json)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Daily rolling JSON log file directory
    pub dir: Option<PathBuf>,
}

/// Keeps the file writer (and exporter) alive; dropping it flushes
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
    #[cfg(feature = "telemetry")]
    provider: Option<opentelemetry_sdk::trace::TracerProvider>,
}

#[cfg(feature = "telemetry")]
impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("OpenTelemetry shutdown failed: {e}");
            }
        }
    }
}

/// Install the global subscriber
pub fn init(config: &LogConfig) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    let mut layers: Vec<BoxedLayer> = vec![match config.format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    }];

    let file_guard = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
            Some(guard)
        }
        None => None,
    };

    let endpoint = std::env::var(OTLP_ENDPOINT_VAR).ok();

    #[cfg(feature = "telemetry")]
    let provider = match endpoint.as_deref() {
        Some(endpoint) => {
            let (layer, provider) = otel::layer(endpoint)?;
            layers.push(layer);
            Some(provider)
        }
        None => None,
    };

    tracing_subscriber::registry().with(layers).with(filter).try_init()?;

    if let Some(dir) = &config.dir {
        tracing::info!(dir = %dir.display(), "Writing daily log files");
    }
    match endpoint {
        Some(endpoint) if cfg!(feature = "telemetry") => {
            tracing::info!(endpoint = %endpoint, "OpenTelemetry export enabled");
        }
        Some(_) => {
            tracing::warn!("{} set but feature 'telemetry' not enabled", OTLP_ENDPOINT_VAR);
            tracing::warn!("Rebuild with: cargo build --features telemetry");
        }
        None => tracing::debug!("OpenTelemetry not configured"),
    }

    Ok(TelemetryGuard {
        _file: file_guard,
        #[cfg(feature = "telemetry")]
        provider,
    })
}

#[cfg(feature = "telemetry")]
mod otel {
    use super::BoxedLayer;
    use anyhow::Result;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::trace::TracerProvider;
    use opentelemetry_sdk::{runtime, Resource};
    use tracing_subscriber::Layer;

    const DEFAULT_SERVICE_NAME: &str = "parcel-server";

    pub fn layer(endpoint: &str) -> Result<(BoxedLayer, TracerProvider)> {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());

        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;
        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                service_name.clone(),
            )]))
            .build();

        let tracer = provider.tracer(service_name);
        Ok((tracing_opentelemetry::layer().with_tracer(tracer).boxed(), provider))
    }
}
