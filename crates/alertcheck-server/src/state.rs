use crate::exporter::Exporter;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub exporter: Arc<Exporter>,
    pub start_time: DateTime<Utc>,
    /// Number of monitored targets, reported by `/health`.
    pub targets: usize,
    /// `"<from>-<to>"` of every checked window.
    pub windows: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(exporter: Arc<Exporter>, targets: usize, windows: Vec<String>) -> Self {
        Self {
            exporter,
            start_time: Utc::now(),
            targets,
            windows: Arc::new(windows),
        }
    }
}
