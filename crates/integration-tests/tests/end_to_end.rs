//! Gateway -> queue -> worker -> assistants API -> result store, over real sockets

mod common;

use common::fake_openai::{FakeOpenAi, DOCUMENT_FAILURE, IMAGE_REPLY};
use common::{Client, Stack, StackOptions};

/// An image is described and the description is pollable
#[tokio::test]
async fn image_upload_completes_with_description() {
    let dir = tempfile::tempdir().unwrap();
    let (_fake, collaborator) = FakeOpenAi::start().await;
    let stack = Stack::start(dir.path(), collaborator, StackOptions::default()).await;
    let client = Client::new(&stack);

    let job_id = client.submit("a.png", "image/png", b"\x89PNG\r\n").await;
    let body = client.wait(&job_id).await;

    assert_eq!(body, serde_json::json!({ "status": "completed", "result": IMAGE_REPLY }));
    assert_eq!(stack.stored_artifacts(), 0, "artifact must be released");
    stack.stop().await;
}

/// A document whose run fails is reported failed, never completed
#[tokio::test]
async fn failing_document_is_reported_failed() {
    let dir = tempfile::tempdir().unwrap();
    let (_fake, collaborator) = FakeOpenAi::start().await;
    let stack = Stack::start(dir.path(), collaborator, StackOptions::default()).await;
    let client = Client::new(&stack);

    let job_id = client.submit("doc.pdf", "application/pdf", b"%PDF-1.4").await;
    let body = client.wait(&job_id).await;

    assert_eq!(body["status"], "failed");
    assert!(body["reason"].as_str().unwrap().contains(DOCUMENT_FAILURE));
    assert!(body.get("result").is_none());
    assert_eq!(stack.stored_artifacts(), 0);

    // Still failed on a later poll
    let (_, again) = client.poll(&job_id).await;
    assert_eq!(again["status"], "failed");
    stack.stop().await;
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (_fake, collaborator) = FakeOpenAi::start().await;
    let stack = Stack::start(dir.path(), collaborator, StackOptions::default()).await;
    let client = Client::new(&stack);

    let (status, body) = client.poll("does-not-exist").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Job not found");
    stack.stop().await;
}

/// Two quick submissions get distinct ids and their own results
#[tokio::test]
async fn quick_submissions_resolve_independently() {
    let dir = tempfile::tempdir().unwrap();
    let (fake, collaborator) = FakeOpenAi::start().await;
    let stack = Stack::start(dir.path(), collaborator, StackOptions::default()).await;
    let client = Client::new(&stack);

    let image = client.submit("a.png", "image/png", b"png").await;
    let document = client.submit("doc.pdf", "application/pdf", b"pdf").await;
    assert_ne!(image, document);

    assert_eq!(client.wait(&image).await["result"], IMAGE_REPLY);
    assert_eq!(client.wait(&document).await["status"], "failed");
    assert_eq!(fake.upload_count(), 2);
    stack.stop().await;
}

#[tokio::test]
async fn missing_file_part_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_fake, collaborator) = FakeOpenAi::start().await;
    let stack = Stack::start(dir.path(), collaborator, StackOptions::default()).await;

    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let response = reqwest::Client::new()
        .post(format!("{}/upload", stack.base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No file uploaded.");
    stack.stop().await;
}
