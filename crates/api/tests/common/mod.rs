#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sketchflow_api::config::{GuardConfig, ServerConfig, SessionConfig, StorageConfig};
use sketchflow_api::router::build_app_router;
use sketchflow_api::state::AppState;
use sketchflow_comfyui::api::ComfyUIApiError;
use sketchflow_comfyui::engine::GenerationEngine;
use sketchflow_comfyui::history::{HistoryEntry, ImageRef};
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use tower::ServiceExt;

/// How long a test waits for a single frame or condition.
pub const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Configuration and state
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` rooted in `root`, with a fast poll interval.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        comfyui_url: "http://127.0.0.1:1".to_string(),
        sessions: SessionConfig {
            poll_interval: Duration::from_millis(10),
            ..SessionConfig::default()
        },
        storage: StorageConfig {
            upload_dir: root.join("uploads"),
            result_dir: root.join("results"),
            workflow_dir: root.join("workflow"),
            max_upload_bytes: 64 * 1024,
        },
        guard: GuardConfig::default(),
    }
}

/// Application state wired to a stub engine, plus the temp directory that
/// holds its files.
pub struct TestEnv {
    pub state: AppState,
    pub engine: Arc<StubEngine>,
    pub root: TempDir,
}

impl TestEnv {
    /// The full router, with the same middleware stack production uses.
    pub fn app(&self) -> Router {
        build_app_router(self.state.clone(), &self.state.config)
    }
}

pub fn test_env(engine: StubEngine) -> TestEnv {
    test_env_with(engine, |_| {})
}

pub fn test_env_with(engine: StubEngine, tweak: impl FnOnce(&mut ServerConfig)) -> TestEnv {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    tweak(&mut config);

    std::fs::create_dir_all(&config.storage.workflow_dir).unwrap();
    std::fs::write(
        config.storage.workflow_dir.join("realistic.json"),
        realistic_template().to_string(),
    )
    .unwrap();

    let engine = Arc::new(engine);
    let state = AppState::new(config, Arc::clone(&engine) as Arc<dyn GenerationEngine>);
    TestEnv {
        state,
        engine,
        root,
    }
}

/// A minimal sketch-to-image graph in the `{"prompt": {...}}` form.
pub fn realistic_template() -> Value {
    json!({
        "prompt": {
            "1": {"class_type": "LoadImage", "inputs": {"image": "PLACEHOLDER_PATH"}},
            "2": {"class_type": "KSampler", "inputs": {"seed": 7}},
            "9": {"class_type": "SaveImage", "inputs": {"images": ["2", 0]}}
        }
    })
}

// ---------------------------------------------------------------------------
// Stub engine
// ---------------------------------------------------------------------------

struct PromptRecord {
    sketch: PathBuf,
    polls: usize,
}

/// In-memory engine that "generates" by echoing the submitted sketch.
///
/// Each prompt stays running for `steps` polls with a growing execution log,
/// then reports success (or the configured failure). `fetch_image` returns
/// the bytes of the sketch the workflow pointed at.
pub struct StubEngine {
    steps: usize,
    failure: Option<String>,
    never_finish: bool,
    reject_submit: bool,
    omit_images: bool,
    gate: Option<Arc<Semaphore>>,
    fetch_gate: Option<Arc<Semaphore>>,
    submits: AtomicUsize,
    polls: AtomicUsize,
    fetches: AtomicUsize,
    cancelled: Mutex<Vec<String>>,
    prompts: Mutex<HashMap<String, PromptRecord>>,
}

impl StubEngine {
    pub fn echo(steps: usize) -> Self {
        Self {
            steps,
            failure: None,
            never_finish: false,
            reject_submit: false,
            omit_images: false,
            gate: None,
            fetch_gate: None,
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            cancelled: Mutex::new(Vec::new()),
            prompts: Mutex::new(HashMap::new()),
        }
    }

    pub fn failing(steps: usize, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::echo(steps)
        }
    }

    /// Accepts prompts but never finishes them.
    pub fn stalled() -> Self {
        Self {
            never_finish: true,
            ..Self::echo(0)
        }
    }

    /// Refuses every submission with an HTTP 500.
    pub fn rejecting() -> Self {
        Self {
            reject_submit: true,
            ..Self::echo(1)
        }
    }

    /// Reports success after `steps` polls but with no image outputs.
    pub fn echo_without_images(steps: usize) -> Self {
        Self {
            omit_images: true,
            ..Self::echo(steps)
        }
    }

    /// Every image fetch must take a permit from `gate` first.
    pub fn gated_fetch(self, gate: Arc<Semaphore>) -> Self {
        Self {
            fetch_gate: Some(gate),
            ..self
        }
    }

    /// Every submission must take a permit from `gate` first.
    pub fn gated(self, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..self
        }
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

fn load_image_path(workflow: &Value) -> Option<String> {
    workflow
        .as_object()?
        .values()
        .find(|node| node["class_type"] == "LoadImage")?
        .pointer("/inputs/image")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl GenerationEngine for StubEngine {
    async fn submit(&self, workflow: &Value) -> Result<String, ComfyUIApiError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_submit {
            return Err(ComfyUIApiError::ApiError {
                status: 500,
                body: "queue full".into(),
            });
        }
        let sketch = load_image_path(workflow).ok_or_else(|| ComfyUIApiError::ApiError {
            status: 400,
            body: "workflow has no LoadImage node".into(),
        })?;

        let prompt_id = format!("prompt-{n}");
        self.prompts.lock().unwrap().insert(
            prompt_id.clone(),
            PromptRecord {
                sketch: PathBuf::from(sketch),
                polls: 0,
            },
        );
        Ok(prompt_id)
    }

    async fn history(&self, prompt_id: &str) -> Result<Option<HistoryEntry>, ComfyUIApiError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let polls = {
            let mut prompts = self.prompts.lock().unwrap();
            let Some(record) = prompts.get_mut(prompt_id) else {
                return Ok(None);
            };
            record.polls += 1;
            record.polls
        };

        let mut messages = vec![json!(["execution_start", {}])];
        for _ in 0..polls.min(self.steps) {
            messages.push(json!(["executing", {}]));
            messages.push(json!(["executed", {}]));
        }

        let done = !self.never_finish && polls > self.steps;
        let entry = if !done {
            json!({
                "status": {"status_str": "", "completed": false, "messages": messages},
                "outputs": {}
            })
        } else if let Some(message) = &self.failure {
            messages.push(json!(["execution_error", {"exception_message": message}]));
            json!({
                "status": {"status_str": "error", "completed": false, "messages": messages},
                "outputs": {}
            })
        } else if self.omit_images {
            messages.push(json!(["execution_success", {}]));
            json!({
                "status": {"status_str": "success", "completed": true, "messages": messages},
                "outputs": {"9": {"images": []}}
            })
        } else {
            messages.push(json!(["execution_success", {}]));
            json!({
                "status": {"status_str": "success", "completed": true, "messages": messages},
                "outputs": {
                    "9": {"images": [
                        {"filename": format!("{prompt_id}.png"), "subfolder": "", "type": "output"}
                    ]}
                }
            })
        };

        Ok(Some(serde_json::from_value(entry).expect("valid history entry")))
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.fetch_gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let prompt_id = image.filename.trim_end_matches(".png");
        let sketch = self
            .prompts
            .lock()
            .unwrap()
            .get(prompt_id)
            .map(|record| record.sketch.clone());

        match sketch {
            Some(path) => Ok(std::fs::read(path).expect("sketch readable")),
            None => Err(ComfyUIApiError::ApiError {
                status: 404,
                body: format!("no image {}", image.filename),
            }),
        }
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.cancelled.lock().unwrap().push(prompt_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Push channel helpers
// ---------------------------------------------------------------------------

/// Next JSON frame from a channel receiver. `None` on Close, on a dropped
/// sender, or after [`WAIT`] without a frame.
pub async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Message>) -> Option<Value> {
    let msg = tokio::time::timeout(WAIT, rx.recv()).await.ok()??;
    match msg {
        Message::Text(text) => Some(serde_json::from_str(text.as_str()).unwrap()),
        Message::Close(_) => None,
        other => panic!("unexpected message: {other:?}"),
    }
}

/// Collect frames up to and including the first `completed` or `error`.
pub async fn frames_until_terminal(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = next_frame(rx).await {
        let terminal = frame["status"] == "completed" || frame["status"] == "error";
        frames.push(frame);
        if terminal {
            return frames;
        }
    }
    panic!("channel ended before a terminal frame: {frames:?}");
}

/// Number of files in `dir`; a missing directory counts as empty.
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// Poll `check` every 10 ms until it holds, panicking after [`WAIT`].
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within {WAIT:?}");
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

const BOUNDARY: &str = "sketchflow-test-boundary";

/// One part of a multipart form.
pub struct Part<'a> {
    pub name: &'a str,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(content_type: &'a str, data: &'a [u8]) -> Self {
        Self {
            name: "file",
            content_type: Some(content_type),
            data,
        }
    }

    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            content_type: None,
            data: value.as_bytes(),
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part.content_type {
            Some(content_type) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"sketch.png\"\r\n\
                         Content-Type: {content_type}\r\n\r\n",
                        part.name
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST a multipart form to `uri`.
pub async fn post_multipart(app: Router, uri: &str, parts: &[Part<'_>]) -> Response<Body> {
    let request = Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
