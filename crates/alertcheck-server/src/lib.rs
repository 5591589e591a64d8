//! Alert validity exporter: configuration, Prometheus exposition, HTTP
//! surface and the per-target validation scheduler.

pub mod app;
pub mod config;
pub mod exporter;
pub mod logging;
pub mod scheduler;
pub mod state;
