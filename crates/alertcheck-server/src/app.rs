use crate::logging::{self, TraceId};
use crate::state::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use chrono::Utc;
use serde::Serialize;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub version: String,
    pub uptime_secs: i64,
    pub targets: usize,
    pub windows: Vec<String>,
    pub trace_id: String,
}

pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .layer(middleware::from_fn(logging::request_logging))
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.exporter.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: (Utc::now() - state.start_time).num_seconds(),
        targets: state.targets,
        windows: state.windows.as_ref().clone(),
        trace_id: trace_id.to_string(),
    })
}
