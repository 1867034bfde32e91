//! HTTP error mapping
//!
//! Converts application errors into JSON error bodies of the form
//! `{ "error": "..." }`.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parcel_core::AppError;
use serde_json::json;
use thiserror::Error;

pub const NO_FILE_MESSAGE: &str = "No file uploaded.";
pub const JOB_NOT_FOUND_MESSAGE: &str = "Job not found";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error("{0}")]
    BadRequest(String),

    /// Malformed or over-limit multipart body
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("{}", JOB_NOT_FOUND_MESSAGE)]
    JobNotFound,
}

impl ApiError {
    pub fn no_file() -> Self {
        ApiError::BadRequest(NO_FILE_MESSAGE.to_string())
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Multipart(e) => (e.status(), e.body_text()),
            ApiError::JobNotFound => (StatusCode::NOT_FOUND, JOB_NOT_FOUND_MESSAGE.to_string()),
            ApiError::App(err) => match err {
                AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
                AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
                AppError::Collaborator(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
                other => {
                    tracing::error!(error = %other, "Request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "An internal error occurred".to_string(),
                    )
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
