use alertcheck_common::types::{Rule, Target};
use alertcheck_common::window::Window;
use chrono::{DateTime, Utc};
use std::fmt;

/// Pulls the current rule set of one target.
#[async_trait::async_trait]
pub trait RuleSource: Send + Sync {
    async fn fetch_rules(&self) -> anyhow::Result<Vec<Rule>>;
}

/// Executes instant queries against one target's query endpoint.
#[async_trait::async_trait]
pub trait QueryBackend: Send + Sync {
    /// Returns `true` when the query produced at least one series.
    async fn check_presence(&self, query: &str) -> anyhow::Result<bool>;
}

/// Which external API a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    Rule,
    Query,
}

impl ApiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKind::Rule => "rule",
            ApiKind::Query => "query",
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validity of one alerting rule over one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub rule_name: String,
    pub rule_id: String,
    pub window: Window,
    pub valid: bool,
}

/// Receives published verdicts. Shared by every reconciliation loop, so
/// implementations must tolerate concurrent writers.
pub trait VerdictSink: Send + Sync {
    /// Publishes both status series of the verdict: `valid` set to 1 and
    /// `invalid` to 0 when the rule is valid, and the reverse otherwise.
    fn publish(&self, target: &Target, verdict: &Verdict);

    /// Marks the end of a pass that fetched and evaluated rules.
    fn record_pass(&self, target: &Target, finished_at: DateTime<Utc>);
}

/// Counts failed calls to the external APIs. Must never block.
pub trait ErrorReporter: Send + Sync {
    fn increment(&self, kind: ApiKind, target: &Target);
}
