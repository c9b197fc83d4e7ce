//! Fixtures for route tests: a scripted comparer and multipart bodies.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use faceverify_core::{CompareError, CompareOptions, EngineReport, FaceComparer};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::routes;
use crate::state::AppState;
use crate::store::StatusStore;
use crate::worker_pool::WorkerPool;

pub const BOUNDARY: &str = "faceverify-test-boundary";

/// What the stub engine does on each call.
#[derive(Clone)]
pub enum Script {
    Report(EngineReport),
    Fail(String),
    FaceNotDetected,
    Panic(String),
}

pub struct StubComparer {
    script: Script,
    delay: Duration,
    seen: Mutex<Vec<(PathBuf, PathBuf, bool)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl StubComparer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Paths passed to each call, and whether both files existed at the time.
    pub fn seen(&self) -> Vec<(PathBuf, PathBuf, bool)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl FaceComparer for StubComparer {
    fn compare(
        &self,
        img1: &Path,
        img2: &Path,
        _options: &CompareOptions,
    ) -> Result<EngineReport, CompareError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((img1.to_path_buf(), img2.to_path_buf(), img1.exists() && img2.exists()));
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);

        match &self.script {
            Script::Report(report) => Ok(report.clone()),
            Script::Fail(message) => Err(CompareError::Io {
                path: img1.display().to_string(),
                source: std::io::Error::other(message.clone()),
            }),
            Script::FaceNotDetected => {
                Err(CompareError::FaceNotDetected(img1.display().to_string()))
            }
            Script::Panic(message) => panic!("{message}"),
        }
    }
}

/// A report the real engine could have produced.
pub fn matching_report() -> EngineReport {
    EngineReport {
        verified: Some(true),
        distance: Some(0.37),
        threshold: Some(0.68),
        model: Some("ArcFace".into()),
        detector_backend: Some("scrfd".into()),
        similarity_metric: Some("cosine".into()),
        facial_areas: serde_json::from_value(json!({
            "img1": {
                "x": 10, "y": 20, "w": 100, "h": 120,
                "confidence": 0.99, "left_eye": [40, 60], "right_eye": [80, 60],
            },
            "img2": {
                "x": 12, "y": 18, "w": 96, "h": 118,
                "confidence": 0.97, "left_eye": null, "right_eye": null,
            },
        }))
        .unwrap(),
    }
}

pub struct TestApp {
    pub comparer: Arc<StubComparer>,
    pub state: AppState,
    pub staging_root: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_comparer(StubComparer::new(Script::Report(matching_report())), 4).await
    }

    pub async fn with_comparer(comparer: StubComparer, workers: usize) -> Self {
        let comparer = Arc::new(comparer);
        let staging_root = tempfile::tempdir().unwrap();
        let state = AppState {
            comparer: comparer.clone(),
            pool: Arc::new(WorkerPool::new(workers, None).unwrap()),
            store: StatusStore::open_in_memory().await.unwrap(),
            compare_options: Arc::new(CompareOptions::default()),
            staging_root: Some(staging_root.path().to_path_buf()),
        };
        Self {
            comparer,
            state,
            staging_root,
        }
    }

    pub fn router(&self) -> Router {
        routes::router(
            self.state.clone(),
            routes::cors_layer(&["http://localhost:3000".to_string()]),
        )
    }

    /// Number of staging directories still present.
    pub fn staged_dirs(&self) -> usize {
        std::fs::read_dir(self.staging_root.path()).unwrap().count()
    }
}

/// One part of a multipart body.
pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: Vec<u8>,
}

impl<'a> Part<'a> {
    pub fn image(name: &'a str, content_type: &'a str, data: Vec<u8>) -> Self {
        let file_name = if content_type.contains("png") { "face.png" } else { "face.jpg" };
        Self {
            name,
            file_name: Some(file_name),
            content_type: Some(content_type),
            data,
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(file_name) = part.file_name {
            disposition.push_str(&format!("; filename=\"{file_name}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn verify_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::post("/api/verify")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// A valid pair of small uploads.
pub fn image_pair() -> Vec<Part<'static>> {
    vec![
        Part::image("image1", "image/jpeg", b"\xff\xd8\xff\xe0 first".to_vec()),
        Part::image("image2", "image/png", b"\x89PNG second".to_vec()),
    ]
}

pub async fn body_json(resp: Response) -> Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}
