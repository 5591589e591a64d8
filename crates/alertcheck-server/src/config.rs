use alertcheck_common::duration::{DurationError, PromDuration};
use alertcheck_common::types::Target;
use alertcheck_common::window::{LadderError, WindowLadder};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Label names the exporter uses itself; configured label keys must not
/// shadow them.
pub const RESERVED_LABELS: &[&str] = &[
    "alertname",
    "alertid",
    "range_from",
    "range_to",
    "status",
    "type",
    "server",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Pause between two passes of a target, e.g. `"5m"`.
    #[serde(default = "default_compute_interval")]
    pub compute_interval: String,
    /// Timeout of every rule and query request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    /// Window boundaries relative to now, nearest first: `["0s", "1h", "1d"]`
    /// checks the windows 0s-1h and 1h-1d.
    #[serde(default)]
    pub validity_check_intervals: Vec<String>,
    /// Names of the labels whose values each server supplies in
    /// `label_values`.
    #[serde(default)]
    pub label_keys: Vec<String>,
    #[serde(default)]
    pub servers: Vec<Target>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_compute_interval() -> String {
    "5m".to_string()
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field} '{value}': {source}")]
    Duration {
        field: &'static str,
        value: String,
        #[source]
        source: DurationError,
    },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("invalid validity_check_intervals: {0}")]
    Ladder(#[from] LadderError),

    #[error("invalid listen address '{0}'")]
    ListenAddress(String),

    #[error("server #{index} has {got} label values but {expected} label keys are configured")]
    LabelCount {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("label key '{0}' is reserved")]
    ReservedLabel(String),

    #[error("label key '{0}' is configured twice")]
    DuplicateLabel(String),

    #[error("server #{index} has an empty {field}")]
    EmptyUrl { index: usize, field: &'static str },
}

/// Checked, parsed form of [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub listen_addr: SocketAddr,
    pub compute_interval: Duration,
    pub request_timeout: Duration,
    pub ladder: Arc<WindowLadder>,
    pub label_keys: Vec<String>,
    pub targets: Vec<Target>,
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{path}'"))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<ResolvedSettings, ConfigError> {
        let compute_interval = parse_duration("compute_interval", &self.compute_interval)?;
        let request_timeout = parse_duration("request_timeout", &self.request_timeout)?;
        let ladder = WindowLadder::parse(self.validity_check_intervals.as_slice())?;

        let ip: IpAddr = self
            .listen_address
            .parse()
            .map_err(|_| ConfigError::ListenAddress(self.listen_address.clone()))?;

        for (i, key) in self.label_keys.iter().enumerate() {
            if RESERVED_LABELS.contains(&key.as_str()) {
                return Err(ConfigError::ReservedLabel(key.clone()));
            }
            if self.label_keys[..i].contains(key) {
                return Err(ConfigError::DuplicateLabel(key.clone()));
            }
        }

        for (index, server) in self.servers.iter().enumerate() {
            if server.rule_url.trim().is_empty() {
                return Err(ConfigError::EmptyUrl {
                    index,
                    field: "rule_url",
                });
            }
            if server.query_url.trim().is_empty() {
                return Err(ConfigError::EmptyUrl {
                    index,
                    field: "query_url",
                });
            }
            if server.label_values.len() != self.label_keys.len() {
                return Err(ConfigError::LabelCount {
                    index,
                    expected: self.label_keys.len(),
                    got: server.label_values.len(),
                });
            }
        }

        Ok(ResolvedSettings {
            listen_addr: SocketAddr::new(ip, self.listen_port),
            compute_interval,
            request_timeout,
            ladder: Arc::new(ladder),
            label_keys: self.label_keys.clone(),
            targets: self.servers.clone(),
        })
    }
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let parsed = PromDuration::parse(value).map_err(|source| ConfigError::Duration {
        field,
        value: value.to_string(),
        source,
    })?;
    if parsed.is_zero() {
        return Err(ConfigError::ZeroDuration(field));
    }
    Ok(parsed.as_std())
}
