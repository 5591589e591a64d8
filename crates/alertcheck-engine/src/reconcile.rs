use crate::cache::CycleCache;
use crate::error::Result;
use crate::evaluate::{RuleValidity, WindowEvaluator};
use crate::extract::ExpressionParser;
use crate::probe::ExistenceProber;
use crate::source::{ApiKind, ErrorReporter, QueryBackend, RuleSource, Verdict, VerdictSink};
use alertcheck_common::types::Target;
use alertcheck_common::window::WindowLadder;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Everything a reconciliation loop talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub rules: Arc<dyn RuleSource>,
    pub backend: Arc<dyn QueryBackend>,
    pub parser: Arc<dyn ExpressionParser>,
    pub sink: Arc<dyn VerdictSink>,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// Counters describing one finished pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// The rule source failed; nothing was evaluated or published.
    pub fetch_failed: bool,
    pub rules_fetched: usize,
    pub rules_evaluated: usize,
    pub verdicts_published: usize,
    pub probes: u64,
    pub cache_hits: u64,
}

/// Reconciliation loop of one target: fetch rules, evaluate them over the
/// window ladder, publish verdicts, sleep, repeat.
pub struct Reconciler {
    target: Target,
    ladder: Arc<WindowLadder>,
    interval: Duration,
    collaborators: Collaborators,
}

impl Reconciler {
    pub fn new(
        target: Target,
        ladder: Arc<WindowLadder>,
        interval: Duration,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            target,
            ladder,
            interval,
            collaborators,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Runs passes forever. Returns only when a pass hits a fatal
    /// configuration error.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            target_name = %self.target.display_name(),
            rule_url = %self.target.rule_url,
            query_url = %self.target.query_url,
            windows = self.ladder.len(),
            interval_secs = self.interval.as_secs(),
            "Reconciliation loop started"
        );
        loop {
            let summary = self.run_pass().await?;
            tracing::debug!(
                target_name = %self.target.display_name(),
                fetch_failed = summary.fetch_failed,
                rules = summary.rules_evaluated,
                verdicts = summary.verdicts_published,
                probes = summary.probes,
                cache_hits = summary.cache_hits,
                "Pass finished"
            );
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One fetch, evaluate and publish cycle with a fresh cache.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let c = &self.collaborators;
        let mut summary = PassSummary::default();

        let rules = match c.rules.fetch_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(
                    server = %self.target.rule_url,
                    error = %e,
                    "Failed to fetch rules"
                );
                c.reporter.increment(ApiKind::Rule, &self.target);
                summary.fetch_failed = true;
                return Ok(summary);
            }
        };
        summary.rules_fetched = rules.len();

        let prober = ExistenceProber::new(
            &self.target,
            c.backend.as_ref(),
            c.parser.as_ref(),
            c.reporter.as_ref(),
        );
        let evaluator = WindowEvaluator::new(&self.ladder, c.parser.as_ref(), prober);
        let mut cache = CycleCache::new();

        for rule in &rules {
            let Some(validity) = evaluator.evaluate(rule, &mut cache).await? else {
                continue;
            };
            summary.rules_evaluated += 1;
            summary.verdicts_published += self.publish(&validity);
            log_validity(&validity);
        }

        summary.probes = cache.misses();
        summary.cache_hits = cache.hits();
        c.sink.record_pass(&self.target, Utc::now());
        Ok(summary)
    }

    fn publish(&self, validity: &RuleValidity) -> usize {
        for window in &validity.windows {
            let verdict = Verdict {
                rule_name: validity.rule_name.clone(),
                rule_id: validity.rule_id.clone(),
                window: window.window.clone(),
                valid: window.valid,
            };
            self.collaborators.sink.publish(&self.target, &verdict);
        }
        validity.windows.len()
    }
}

fn log_validity(validity: &RuleValidity) {
    let is_valid = serde_json::to_string(&validity.is_valid()).unwrap_or_default();
    let is_vector_present =
        serde_json::to_string(&validity.is_vector_present()).unwrap_or_default();
    tracing::info!(
        alertname = %validity.rule_name,
        id = %validity.rule_id,
        is_vector_present = %is_vector_present,
        is_valid = %is_valid,
        "Rule validity"
    );
}
