//! HTTP Server
//!
//! Binds the gateway router and serves it until shutdown.

use crate::router::{build_router, AppState};
use axum::Router;
use parcel_core::application::ShutdownToken;
use parcel_core::Result;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 3000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl HttpServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct HttpServer {
    config: HttpServerConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.config.max_upload_bytes)
    }

    /// Bind the configured address and serve until `shutdown` fires
    pub async fn serve(self, shutdown: ShutdownToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener; in-flight requests drain on shutdown
    pub async fn serve_on(self, listener: TcpListener, mut shutdown: ShutdownToken) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        info!(%addr, max_upload_bytes = self.config.max_upload_bytes, "HTTP server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}
