//! Request handlers

use crate::error::{ApiError, ApiResult};
use crate::router::AppState;
use crate::types::{HealthResponse, StatusResponse, UploadAccepted, UploadCompleted, UploadFailed};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parcel_core::application::{JobOutcome, PollOutcome, SubmitOutcome};
use parcel_core::domain::JobState;
use tracing::{debug, info, warn};

/// Multipart field carrying the artifact
pub const FILE_FIELD: &str = "file";

const FALLBACK_MIME: &str = "application/octet-stream";

struct UploadedFile {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

async fn read_file_field(mut multipart: Multipart) -> ApiResult<Option<UploadedFile>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().unwrap_or(FALLBACK_MIME).to_string();
        let bytes = field.bytes().await?;
        return Ok(Some(UploadedFile {
            name,
            mime_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

/// `POST /upload`
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let multipart = multipart.map_err(|e| {
        debug!(error = %e, "Upload is not a multipart body");
        ApiError::no_file()
    })?;

    let file = read_file_field(multipart).await?.ok_or_else(ApiError::no_file)?;
    info!(file = %file.name, mime = %file.mime_type, size = file.bytes.len(), "Upload received");

    let outcome = state
        .submission
        .accept_upload(&file.name, &file.mime_type, &file.bytes)
        .await?;

    Ok(match outcome {
        SubmitOutcome::Queued(job_id) => {
            (StatusCode::ACCEPTED, Json(UploadAccepted { job_id })).into_response()
        }
        SubmitOutcome::Finished { job_id, outcome } => match outcome {
            JobOutcome::Completed(result) => Json(UploadCompleted {
                job_id,
                status: JobState::Completed.as_str(),
                result,
            })
            .into_response(),
            JobOutcome::Failed(error) => {
                warn!(job_id = %job_id, error = %error, "Inline job failed");
                (StatusCode::BAD_GATEWAY, Json(UploadFailed { error, job_id })).into_response()
            }
            // Inline execution only returns terminal outcomes; answer as queued if not
            JobOutcome::Requeued { .. } => {
                (StatusCode::ACCEPTED, Json(UploadAccepted { job_id })).into_response()
            }
        },
    })
}

/// `GET /result/{job_id}`
pub async fn result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let outcome = state.status.poll(&job_id).await?;
    let status = outcome.status().ok_or(ApiError::JobNotFound)?.as_str();

    let (result, reason) = match outcome {
        PollOutcome::Completed(result) => (result, None),
        PollOutcome::Failed(reason) => (None, reason),
        _ => (None, None),
    };

    Ok(Json(StatusResponse {
        status,
        result,
        reason,
    }))
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: parcel_core::VERSION,
    })
}
