//! Response bodies

use parcel_core::domain::JobId;
use serde::Serialize;

/// `202` answer to a queued upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub job_id: JobId,
}

/// `200` answer to a synchronous upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleted {
    pub job_id: JobId,
    pub status: &'static str,
    pub result: String,
}

/// `502` answer to a synchronous upload whose job failed
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailed {
    pub error: String,
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
