//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use stevedore_core::config::AppConfig;
use stevedore_metadata::MetadataStore;
use stevedore_server::{AppState, Coordinator, create_router};
use stevedore_storage::{ScratchDir, TargetStore};
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub root: PathBuf,
    _temp_dir: Option<TempDir>,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server on a fresh temporary directory.
    ///
    /// Uses the tiny test chunk size (4 bytes) so multi-chunk flows run with
    /// hand-sized payloads.
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        Self::open(root, Some(temp_dir), |_| {}).await
    }

    /// Create a test server with config modifications applied on top of the
    /// test defaults.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        Self::open(root, Some(temp_dir), modifier).await
    }

    /// Re-open a server over this server's directories, simulating a process
    /// restart: fresh stores, same durable state. The original must be kept
    /// alive so the backing temp directory survives.
    pub async fn reopen(&self) -> Self {
        Self::open(self.root.clone(), None, |_| {}).await
    }

    async fn open<F>(root: PathBuf, temp_dir: Option<TempDir>, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = AppConfig::for_testing(&root);
        modifier(&mut config);

        let targets = TargetStore::new(&config.storage.upload_dir)
            .await
            .expect("Failed to create upload directory");
        let scratch = ScratchDir::new(&config.storage.temp_dir)
            .await
            .expect("Failed to create temp directory");
        let metadata = stevedore_metadata::from_config(&config.metadata)
            .await
            .expect("Failed to create metadata store");

        let state = AppState::new(config, metadata, targets, scratch);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            root,
            _temp_dir: temp_dir,
        }
    }

    /// Access the underlying metadata store.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Access the session coordinator.
    pub fn coordinator(&self) -> &Coordinator {
        &self.state.coordinator
    }

    /// Path of a session's assembled target file.
    pub fn target_path(&self, upload_id: &str) -> PathBuf {
        self.state
            .coordinator
            .targets()
            .target_path(upload_id)
            .expect("invalid upload id in test")
    }
}

/// Make a JSON request and decode the JSON response.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

const MULTIPART_BOUNDARY: &str = "----stevedore-test-boundary";

/// Assemble a multipart/form-data chunk upload body.
#[allow(dead_code)]
pub fn multipart_chunk_body(
    upload_id: &str,
    chunk_index: u64,
    total_chunks: u64,
    payload: &[u8],
) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in [
        ("uploadId", upload_id.to_string()),
        ("chunkIndex", chunk_index.to_string()),
        ("totalChunks", total_chunks.to_string()),
    ] {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"chunk\"; filename=\"blob\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    let content_type = format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}");
    (content_type, body)
}

/// POST one chunk through the router.
#[allow(dead_code)]
pub async fn send_chunk(
    router: &axum::Router,
    upload_id: &str,
    chunk_index: u64,
    total_chunks: u64,
    payload: &[u8],
) -> (StatusCode, Value) {
    let (content_type, body) =
        multipart_chunk_body(upload_id, chunk_index, total_chunks, payload);
    let request = Request::builder()
        .method("POST")
        .uri("/api/upload/chunk")
        .header("Content-Type", content_type)
        .body(Body::from(body))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// POST /api/upload/init with the standard fields.
#[allow(dead_code)]
pub async fn init_upload(
    router: &axum::Router,
    upload_id: &str,
    filename: &str,
    file_size: u64,
) -> (StatusCode, Value) {
    json_request(
        router,
        "POST",
        "/api/upload/init",
        Some(serde_json::json!({
            "uploadId": upload_id,
            "filename": filename,
            "fileSize": file_size,
        })),
    )
    .await
}
