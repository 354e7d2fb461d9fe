//! Test helpers: in-memory app harness, a recording storage double, and a
//! multipart request builder.

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use crate::config::Config;
use crate::records::memory::MemoryRecordStore;
use crate::storage::backend::{FileMetadata, ObjectStorage};
use crate::storage::memory::MemoryStorage;
use crate::AppState;

pub const BOUNDARY: &str = "stencil-test-boundary";

pub struct TestHarness {
    pub app: Router,
    pub records: Arc<MemoryRecordStore>,
    pub storage: Arc<MemoryStorage>,
}

fn test_config(environment: Option<&str>) -> Config {
    let mut config = Config::default();
    config.server.environment = environment.map(str::to_string);
    config
}

/// Router over in-memory records and storage.
pub fn test_app(environment: Option<&str>) -> TestHarness {
    let records = Arc::new(MemoryRecordStore::new());
    let storage = Arc::new(MemoryStorage::new("memory://uploads"));
    let state = Arc::new(AppState {
        config: test_config(environment),
        records: records.clone(),
        storage: storage.clone(),
    });
    TestHarness {
        app: crate::server::app(state),
        records,
        storage,
    }
}

#[derive(Debug, Clone)]
pub struct UploadCall {
    pub name: String,
    pub content: Bytes,
    pub metadata: FileMetadata,
}

/// Storage double that records every call and optionally fails it.
pub struct RecordingStorage {
    calls: Mutex<Vec<UploadCall>>,
    fail: bool,
}

impl RecordingStorage {
    pub fn new(fail: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail,
        }
    }

    pub fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl ObjectStorage for RecordingStorage {
    fn upload_file(
        &self,
        name: &str,
        content: Bytes,
        metadata: FileMetadata,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            self.calls.lock().unwrap().push(UploadCall {
                name: name.clone(),
                content,
                metadata,
            });
            if self.fail {
                anyhow::bail!("simulated storage outage");
            }
            Ok(format!("memory://recorded/{name}"))
        })
    }
}

pub fn recording_app(fail: bool) -> (Router, Arc<RecordingStorage>) {
    let storage = Arc::new(RecordingStorage::new(fail));
    let state = Arc::new(AppState {
        config: test_config(None),
        records: Arc::new(MemoryRecordStore::new()),
        storage: storage.clone(),
    });
    (crate::server::app(state), storage)
}

/// Drive one request through the router and decode the JSON body.
///
/// Non-JSON or empty bodies decode to `Value::Null`.
pub async fn send(
    app: &Router,
    request: Request<Body>,
) -> (StatusCode, HeaderMap, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, headers, body)
}

pub enum MultipartPart {
    File {
        field: String,
        filename: String,
        content_type: Option<String>,
        content: Vec<u8>,
    },
    Text {
        field: String,
        value: String,
    },
}

impl MultipartPart {
    pub fn file(field: &str, filename: &str, content_type: Option<&str>, content: &[u8]) -> Self {
        MultipartPart::File {
            field: field.to_string(),
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
            content: content.to_vec(),
        }
    }

    pub fn text(field: &str, value: &str) -> Self {
        MultipartPart::Text {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Build a `POST /file` request with a `multipart/form-data` body.
pub fn multipart_request(parts: &[MultipartPart]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            MultipartPart::File {
                field,
                filename,
                content_type,
                content,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
                    )
                    .as_bytes(),
                );
                if let Some(content_type) = content_type {
                    body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(content);
            }
            MultipartPart::Text { field, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/file")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}
