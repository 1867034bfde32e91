//! Local stand-in for the assistants API
//!
//! Images are described as "a cat"; document runs fail.

use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parcel_core::port::Collaborator;
use parcel_infra_openai::{OpenAiAssistantClient, OpenAiConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const IMAGE_REPLY: &str = "a cat";
pub const DOCUMENT_FAILURE: &str = "File type not supported for retrieval";

#[derive(Default)]
struct Inner {
    next_id: usize,
    purposes: HashMap<String, String>,
    threads: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct FakeOpenAi {
    inner: Arc<Mutex<Inner>>,
}

impl FakeOpenAi {
    fn next_id(&self, prefix: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        format!("{}-{}", prefix, inner.next_id)
    }

    pub fn upload_count(&self) -> usize {
        self.inner.lock().unwrap().purposes.len()
    }

    /// Serve on a random port and return a client pointed at it
    pub async fn start() -> (Self, Arc<dyn Collaborator>) {
        let fake = FakeOpenAi::default();
        let app = Router::new()
            .route("/v1/files", post(upload))
            .route("/v1/threads", post(create_thread))
            .route("/v1/threads/{thread_id}/runs", post(create_run))
            .with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = OpenAiConfig::new("sk-test", "asst_test").with_base_url(format!("http://{}/v1", addr));
        let client: Arc<dyn Collaborator> = Arc::new(OpenAiAssistantClient::new(config).unwrap());
        (fake, client)
    }
}

async fn upload(State(fake): State<FakeOpenAi>, mut multipart: Multipart) -> Json<Value> {
    let mut purpose = String::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("purpose") {
            purpose = field.text().await.unwrap();
        } else {
            field.bytes().await.unwrap();
        }
    }
    let id = fake.next_id("file");
    fake.inner.lock().unwrap().purposes.insert(id.clone(), purpose);
    Json(json!({ "id": id, "object": "file" }))
}

async fn create_thread(State(fake): State<FakeOpenAi>, Json(body): Json<Value>) -> Json<Value> {
    let message = &body["messages"][0];
    let file_id = message["attachments"][0]["file_id"]
        .as_str()
        .or_else(|| message["content"][1]["image_file"]["file_id"].as_str())
        .unwrap_or_default()
        .to_string();
    let id = fake.next_id("thread");
    fake.inner.lock().unwrap().threads.insert(id.clone(), file_id);
    Json(json!({ "id": id, "object": "thread" }))
}

fn delta(text: &str) -> String {
    format!(
        "event: thread.message.delta\ndata: {}\n\n",
        json!({ "delta": { "content": [{ "index": 0, "type": "text", "text": { "value": text } }] } })
    )
}

async fn create_run(State(fake): State<FakeOpenAi>, Path(thread_id): Path<String>) -> Response {
    let purpose = {
        let inner = fake.inner.lock().unwrap();
        inner
            .threads
            .get(&thread_id)
            .and_then(|file_id| inner.purposes.get(file_id))
            .cloned()
            .unwrap_or_default()
    };

    let body = if purpose == "vision" {
        format!(
            "event: thread.run.created\ndata: {{}}\n\n{}{}event: thread.run.completed\ndata: {{}}\n\nevent: done\ndata: [DONE]\n\n",
            delta("a "),
            delta("cat")
        )
    } else {
        format!(
            "event: thread.run.failed\ndata: {}\n\n",
            json!({ "status": "failed", "last_error": { "code": "invalid_file", "message": DOCUMENT_FAILURE } })
        )
    };
    ([("content-type", "text/event-stream")], body).into_response()
}
