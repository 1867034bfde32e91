//! HTTP API Layer
//!
//! Upload gateway and status endpoint for the Parcel analysis queue.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::{build_router, AppState};
pub use server::{HttpServer, HttpServerConfig};
