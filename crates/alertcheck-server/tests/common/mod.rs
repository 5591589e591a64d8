#![allow(dead_code)]

use alertcheck_server::app;
use alertcheck_server::exporter::Exporter;
use alertcheck_server::state::AppState;
use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

pub struct TestContext {
    pub exporter: Arc<Exporter>,
    pub state: AppState,
    pub app: axum::Router,
}

pub fn build_test_context() -> Result<TestContext> {
    let exporter = Arc::new(Exporter::new(&["cluster".to_string()])?);
    let state = AppState::new(
        exporter.clone(),
        1,
        vec!["0s-1h".to_string(), "1h-1d".to_string()],
    );
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        exporter,
        state,
        app,
    })
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub trace_id: Option<String>,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

pub async fn request_no_body(app: &axum::Router, method: &str, uri: &str) -> TestResponse {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
    };
    let content_type = header("content-type");
    let trace_id = header("x-trace-id");
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");

    TestResponse {
        status,
        content_type,
        trace_id,
        body: String::from_utf8_lossy(&bytes).to_string(),
    }
}

/// Writes `content` to a fresh config file and returns its directory guard
/// together with the path.
pub fn write_config(content: &str) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("alertcheck.toml");
    std::fs::write(&path, content).expect("config should be written");
    (dir, path.to_string_lossy().to_string())
}
