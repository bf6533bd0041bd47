#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, Response},
};
use clap::Parser;
use futures::StreamExt;
use http_body_util::BodyExt;
use rikka::{
    AppState, ServerConfig, router,
    storage::{ActiveBackend, ContentStream, StorageBackend, StorageError, StoredFile, StoredFileReference},
};
use tower::ServiceExt;

pub const BOUNDARY: &str = "RIKKABOUNDARY";

/// In-memory backend that remembers what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: AtomicUsize,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn store_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn store(
        &self,
        filename: &str,
        mut content: ContentStream<'_>,
        _size_hint: Option<u64>,
    ) -> Result<StoredFile, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut data = Vec::new();
        while let Some(chunk) = content.next().await {
            data.extend_from_slice(&chunk?);
        }

        let size = data.len() as u64;
        self.files.lock().unwrap().insert(filename.to_string(), data);
        Ok(StoredFile {
            reference: StoredFileReference::new(format!("memory://{filename}")),
            filename: filename.to_string(),
            size,
        })
    }
}

/// Backend whose remote end is always down.
#[derive(Debug, Default)]
pub struct FailingBackend;

#[async_trait]
impl StorageBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn store(
        &self,
        _filename: &str,
        _content: ContentStream<'_>,
        _size_hint: Option<u64>,
    ) -> Result<StoredFile, StorageError> {
        Err(StorageError::Unavailable(
            "connect to 10.0.0.7:9000 refused (secret-bucket)".into(),
        ))
    }
}

pub fn config(password: &str, size_mb: &str) -> ServerConfig {
    ServerConfig::try_parse_from(["rikka", "--pwd", password, "--size", size_mb])
        .expect("test config should parse")
        .checked()
        .expect("test config should be valid")
}

pub fn app(backend: ActiveBackend) -> Router {
    router(AppState::new(config("rikka", "5"), backend))
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes: Bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
