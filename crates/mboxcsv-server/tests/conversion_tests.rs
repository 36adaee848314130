//! End-to-end conversion tests through the legacy single-shot upload
//!
//! Exercises the multipart transport, the worker pool, and the archive
//! contents together: upload an mbox, wait for the conversion, pull the ZIP
//! apart, and check the tables.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::io::{Cursor, Read};
use std::time::Duration;
use tower::ServiceExt;

use mboxcsv_server::{config::Config, router, state::AppState};

const BOUNDARY: &str = "mboxcsv-test-boundary";

const TWO_MESSAGES: &[u8] = b"From alice Thu Jan  1 00:00:00 1970\n\
From: Alice <alice@example.com>\n\
To: bob@example.com\n\
Subject: first\n\
Message-ID: <one@example.com>\n\
\n\
hello bob\n\
From bob Thu Jan  1 00:00:00 1970\n\
From: bob@example.com\n\
Subject: second\n\
Message-ID: <two@example.com>\n\
\n\
hello alice\n";

async fn test_app() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = dir.path().join("data");
    config.storage.download_dir = dir.path().join("downloads");

    let state = AppState::init(config).await.unwrap();
    (dir, router(state))
}

fn multipart_body(filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn upload(app: &Router, uri: &str, content: &[u8]) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body("mail.mbox", content)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    body["data"]["job_id"].as_str().unwrap().to_string()
}

async fn wait_for_done(app: &Router, job_id: &str) -> Value {
    for _ in 0..250 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/jobs/{}", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        match body["data"]["status"].as_str() {
            Some("done") => return body,
            Some("error") => panic!("Conversion failed: {:?}", body["data"]["error"]),
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    panic!("Job {} never completed", job_id);
}

/// Download the archive and return (entry name, content) pairs
async fn download_entries(app: &Router, job_id: &str) -> Vec<(String, String)> {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/jobs/{}/download", job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();

    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        entries.push((entry.name().to_string(), content));
    }
    entries
}

#[tokio::test]
async fn test_default_export_has_header_columns_only() {
    let (_dir, app) = test_app().await;

    let job_id = upload(&app, "/api/v1/upload", TWO_MESSAGES).await;
    let done = wait_for_done(&app, &job_id).await;
    assert_eq!(done["data"]["processed_messages"], 2);

    let entries = download_entries(&app, &job_id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "emails.csv");

    let lines: Vec<&str> = entries[0].1.lines().collect();
    assert_eq!(lines[0], "date,from,to,cc,bcc,subject,message_id");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("Alice <alice@example.com>"));
    assert!(lines[2].contains("second"));
}

#[tokio::test]
async fn test_body_and_thread_columns_via_query_options() {
    let (_dir, app) = test_app().await;

    let job_id = upload(
        &app,
        "/api/v1/upload?include_body=true&include_thread_id=true",
        TWO_MESSAGES,
    )
    .await;
    wait_for_done(&app, &job_id).await;

    let entries = download_entries(&app, &job_id).await;
    let lines: Vec<&str> = entries[0].1.lines().collect();
    assert_eq!(lines[0], "date,from,to,cc,bcc,subject,message_id,thread_id,body");
    assert!(lines[1].contains("hello bob"));
}

#[tokio::test]
async fn test_attachments_table_in_archive() {
    let (_dir, app) = test_app().await;

    let data = b"From a Thu Jan  1 00:00:00 1970\n\
From: alice@example.com\n\
Subject: with attachment\n\
Message-ID: <att@example.com>\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"b\"\n\
\n\
--b\n\
Content-Type: text/plain\n\
\n\
see attached\n\
--b\n\
Content-Type: application/pdf; name=\"report.pdf\"\n\
Content-Disposition: attachment; filename=\"report.pdf\"\n\
Content-Transfer-Encoding: base64\n\
\n\
aGVsbG8gd29ybGQ=\n\
--b--\n";

    let job_id = upload(&app, "/api/v1/upload?include_attachments=true", data).await;
    wait_for_done(&app, &job_id).await;

    let entries = download_entries(&app, &job_id).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].0, "attachments.csv");

    let lines: Vec<&str> = entries[1].1.lines().collect();
    assert_eq!(lines[0], "message_id,filename,content_type,size_bytes");
    assert!(lines[1].contains("report.pdf"));
    assert!(lines[1].contains("application/pdf"));
}

#[tokio::test]
async fn test_input_file_removed_after_conversion() {
    let (dir, app) = test_app().await;

    let job_id = upload(&app, "/api/v1/upload", TWO_MESSAGES).await;
    wait_for_done(&app, &job_id).await;

    let input = dir
        .path()
        .join("data/uploads")
        .join(format!("{}.mbox", job_id));
    assert!(!input.exists());
}

#[tokio::test]
async fn test_multipart_without_file_field_rejected() {
    let (_dir, app) = test_app().await;

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n");
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
