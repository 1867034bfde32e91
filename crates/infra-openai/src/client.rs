// OpenAI Assistants v2 client
use crate::config::OpenAiConfig;
use crate::sse::{SseDecoder, SseEvent};
use crate::wire::{self, MessageDelta, ObjectId, RunObject, RunRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use parcel_core::domain::ProcessingMode;
use parcel_core::port::{Collaborator, CollaboratorError, RemoteFileId, SnapshotStream, ThreadId};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

// Lowercase: HeaderMap rejects uppercase static names
const BETA_HEADER: &str = "openai-beta";
const BETA_VALUE: &str = "assistants=v2";

pub struct OpenAiAssistantClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiAssistantClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(BETA_HEADER, HeaderValue::from_static(BETA_VALUE));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(5)
            .build()?;

        info!(base_url = %config.base_url, assistant_id = %config.assistant_id, "Collaborator client ready");
        Ok(Self { client, config })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.api_key.expose_secret())
    }

    /// Parse `{ "id": ... }` from a successful response
    async fn object_id(
        response: Response,
        to_error: fn(String) -> CollaboratorError,
    ) -> Result<String, CollaboratorError> {
        let response = check_status(response, to_error).await?;
        let object: ObjectId = response
            .json()
            .await
            .map_err(|e| to_error(format!("unreadable response: {}", e)))?;
        Ok(object.id)
    }
}

/// Map a non-2xx response to `to_error` with the API's message
async fn check_status(
    response: Response,
    to_error: fn(String) -> CollaboratorError,
) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(to_error(format!("HTTP {}: {}", status, wire::error_message(&body))))
}

#[async_trait]
impl Collaborator for OpenAiAssistantClient {
    async fn upload_file(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        mode: ProcessingMode,
    ) -> Result<RemoteFileId, CollaboratorError> {
        let size = bytes.len();
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let part = match part.mime_str(mime_type) {
            Ok(part) => part,
            Err(e) => return Err(CollaboratorError::Upload(format!("bad MIME type {}: {}", mime_type, e))),
        };
        let form = Form::new()
            .text("purpose", wire::file_purpose(mode))
            .part("file", part);

        debug!(file = %file_name, size, purpose = wire::file_purpose(mode), "Uploading file");
        let response = self
            .client
            .post(self.config.endpoint("files"))
            .header(AUTHORIZATION, self.bearer())
            .multipart(form)
            .send()
            .await
            .map_err(|e| CollaboratorError::Upload(e.to_string()))?;

        Self::object_id(response, CollaboratorError::Upload).await
    }

    async fn create_thread(
        &self,
        file_id: &RemoteFileId,
        mode: ProcessingMode,
    ) -> Result<ThreadId, CollaboratorError> {
        let response = self
            .client
            .post(self.config.endpoint("threads"))
            .header(AUTHORIZATION, self.bearer())
            .json(&wire::thread_request(file_id, mode))
            .send()
            .await
            .map_err(|e| CollaboratorError::Thread(e.to_string()))?;

        Self::object_id(response, CollaboratorError::Thread).await
    }

    async fn start_run(&self, thread_id: &ThreadId) -> Result<SnapshotStream, CollaboratorError> {
        let response = self
            .client
            .post(self.config.endpoint(&format!("threads/{}/runs", thread_id)))
            .header(AUTHORIZATION, self.bearer())
            .header(ACCEPT, "text/event-stream")
            .json(&RunRequest {
                assistant_id: &self.config.assistant_id,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| CollaboratorError::Run(e.to_string()))?;

        let response = check_status(response, CollaboratorError::Run).await?;
        Ok(snapshot_stream(response.bytes_stream().boxed()))
    }
}

/// What one SSE event means for the run
#[derive(Debug, PartialEq)]
enum RunEvent {
    /// New text appended to the cumulative snapshot
    Text(String),
    Failed(String),
    Done,
    Ignore,
}

fn interpret(event: &SseEvent) -> RunEvent {
    if event.data.trim() == "[DONE]" {
        return RunEvent::Done;
    }
    match event.event.as_deref() {
        Some("thread.message.delta") => match serde_json::from_str::<MessageDelta>(&event.data) {
            Ok(delta) => RunEvent::Text(delta.text()),
            Err(e) => RunEvent::Failed(format!("malformed message delta: {}", e)),
        },
        Some(kind @ ("thread.run.failed" | "thread.run.cancelled" | "thread.run.expired")) => {
            let run: Option<RunObject> = serde_json::from_str(&event.data).ok();
            let message = run
                .as_ref()
                .and_then(|r| r.last_error.as_ref())
                .map(|e| e.message.clone())
                .or_else(|| run.and_then(|r| r.status))
                .unwrap_or_else(|| kind.to_string());
            RunEvent::Failed(message)
        }
        Some("error") => RunEvent::Failed(wire::error_message(&event.data)),
        Some("done") => RunEvent::Done,
        _ => RunEvent::Ignore,
    }
}

struct RunState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    snapshot: String,
    body_done: bool,
    finished: bool,
}

/// Turn an SSE body into cumulative text snapshots
///
/// Yields once per text delta; a failure event or a broken body yields one
/// error and ends the stream.
fn snapshot_stream(body: BoxStream<'static, reqwest::Result<Bytes>>) -> SnapshotStream {
    let state = RunState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        snapshot: String::new(),
        body_done: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(event) = state.pending.pop_front() {
                match interpret(&event) {
                    RunEvent::Text(fragment) if fragment.is_empty() => {}
                    RunEvent::Text(fragment) => {
                        state.snapshot.push_str(&fragment);
                        let snapshot = state.snapshot.clone();
                        return Some((Ok(snapshot), state));
                    }
                    RunEvent::Failed(message) => {
                        warn!(error = %message, "Run failed");
                        state.finished = true;
                        return Some((Err(CollaboratorError::Run(message)), state));
                    }
                    RunEvent::Done => {
                        state.finished = true;
                        return None;
                    }
                    RunEvent::Ignore => {}
                }
                continue;
            }

            if state.body_done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(CollaboratorError::Stream(e.to_string())), state));
                }
                None => {
                    state.body_done = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
