// Assistants v2 request/response bodies (only the fields in use)
use parcel_core::domain::ProcessingMode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Upload `purpose` per mode
pub fn file_purpose(mode: ProcessingMode) -> &'static str {
    match mode {
        ProcessingMode::Vision => "vision",
        ProcessingMode::Document => "assistants",
    }
}

/// Thread body with a single user message carrying the file
pub fn thread_request(file_id: &str, mode: ProcessingMode) -> Value {
    let message = match mode {
        ProcessingMode::Vision => json!({
            "role": "user",
            "content": [
                { "type": "text", "text": mode.instruction() },
                { "type": "image_file", "image_file": { "file_id": file_id } }
            ]
        }),
        ProcessingMode::Document => json!({
            "role": "user",
            "content": mode.instruction(),
            "attachments": [
                { "file_id": file_id, "tools": [{ "type": "file_search" }] }
            ]
        }),
    };
    json!({ "messages": [message] })
}

#[derive(Debug, Serialize)]
pub struct RunRequest<'a> {
    pub assistant_id: &'a str,
    pub stream: bool,
}

/// Any object response; only the id matters
#[derive(Debug, Deserialize)]
pub struct ObjectId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
}

/// `thread.message.delta` payload
#[derive(Debug, Deserialize)]
pub struct MessageDelta {
    pub delta: DeltaBody,
}

#[derive(Debug, Deserialize)]
pub struct DeltaBody {
    #[serde(default)]
    pub content: Vec<DeltaContent>,
}

#[derive(Debug, Deserialize)]
pub struct DeltaContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<DeltaText>,
}

#[derive(Debug, Deserialize)]
pub struct DeltaText {
    #[serde(default)]
    pub value: Option<String>,
}

impl MessageDelta {
    /// Concatenated text fragments of this delta
    pub fn text(&self) -> String {
        self.delta
            .content
            .iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text.as_ref().and_then(|t| t.value.as_deref()))
            .collect()
    }
}

/// Terminal run object (`thread.run.failed` and friends)
#[derive(Debug, Deserialize)]
pub struct RunObject {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_error: Option<ApiErrorDetail>,
}

/// Best human-readable message from an error body
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => match serde_json::from_str::<ApiErrorDetail>(body) {
            Ok(detail) => detail.message,
            Err(_) if body.trim().is_empty() => "no response body".to_string(),
            Err(_) => body.trim().to_string(),
        },
    }
}
