use crate::error::EngineError;
use crate::extract::{ExpressionParser, PromqlParser};
use crate::reconcile::{Collaborators, Reconciler};
use crate::source::{ApiKind, ErrorReporter, QueryBackend, RuleSource, Verdict, VerdictSink};
use alertcheck_common::types::{Rule, RuleKind, Target};
use alertcheck_common::window::WindowLadder;
use alertcheck_promql::ParseError;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct ScriptedRules {
    rules: Mutex<anyhow::Result<Vec<Rule>>>,
    calls: AtomicUsize,
}

impl ScriptedRules {
    fn ok(rules: Vec<Rule>) -> Arc<Self> {
        Arc::new(Self {
            rules: Mutex::new(Ok(rules)),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            rules: Mutex::new(Err(anyhow::anyhow!("connection refused"))),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl RuleSource for ScriptedRules {
    async fn fetch_rules(&self) -> anyhow::Result<Vec<Rule>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.rules.lock().unwrap() {
            Ok(rules) => Ok(rules.clone()),
            Err(e) => Err(anyhow::anyhow!("{e}")),
        }
    }
}

/// Answers presence queries from the selectors it was told are present;
/// queries mentioning a selector in `failing` return an error.
struct ScriptedBackend {
    present: Vec<String>,
    failing: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(present: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            present: present.iter().map(|s| s.to_string()).collect(),
            failing: Vec::new(),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn with_failures(present: &[&str], failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            present: present.iter().map(|s| s.to_string()).collect(),
            failing: failing.iter().map(|s| s.to_string()).collect(),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn count_for(&self, selector: &str) -> usize {
        let needle = format!("({selector}[");
        self.queries()
            .iter()
            .filter(|q| q.contains(&needle))
            .count()
    }
}

#[async_trait::async_trait]
impl QueryBackend for ScriptedBackend {
    async fn check_presence(&self, query: &str) -> anyhow::Result<bool> {
        self.queries.lock().unwrap().push(query.to_string());
        let mentions = |s: &String| query.contains(&format!("({s}["));
        if self.failing.iter().any(mentions) {
            anyhow::bail!("HTTP 503: backend overloaded");
        }
        Ok(self.present.iter().any(mentions))
    }
}

#[derive(Default)]
struct RecordingSink {
    verdicts: Mutex<Vec<Verdict>>,
    passes: Mutex<Vec<DateTime<Utc>>>,
}

impl RecordingSink {
    fn verdicts(&self) -> Vec<Verdict> {
        self.verdicts.lock().unwrap().clone()
    }

    fn verdict(&self, rule_id: &str, window: &str) -> Option<bool> {
        self.verdicts()
            .into_iter()
            .rev()
            .find(|v| v.rule_id == rule_id && v.window.to_string() == window)
            .map(|v| v.valid)
    }
}

impl VerdictSink for RecordingSink {
    fn publish(&self, _target: &Target, verdict: &Verdict) {
        self.verdicts.lock().unwrap().push(verdict.clone());
    }

    fn record_pass(&self, _target: &Target, finished_at: DateTime<Utc>) {
        self.passes.lock().unwrap().push(finished_at);
    }
}

#[derive(Default)]
struct CountingReporter {
    errors: Mutex<Vec<(ApiKind, String)>>,
}

impl CountingReporter {
    fn count(&self, kind: ApiKind) -> usize {
        self.errors
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl ErrorReporter for CountingReporter {
    fn increment(&self, kind: ApiKind, target: &Target) {
        let server = match kind {
            ApiKind::Rule => target.rule_url.clone(),
            ApiKind::Query => target.query_url.clone(),
        };
        self.errors.lock().unwrap().push((kind, server));
    }
}

/// Accepts every rule expression but rejects every generated check query.
struct RejectingParser;

impl ExpressionParser for RejectingParser {
    fn selectors(&self, expression: &str) -> Result<BTreeSet<String>, ParseError> {
        PromqlParser.selectors(expression)
    }

    fn validate(&self, _query: &str) -> Result<(), ParseError> {
        Err(ParseError::new("unexpected token", 0))
    }
}

/// Reports the expression `dashed_name` as the bare selector
/// `http.requests-total`, which reads back as a subtraction.
struct UnquotingParser;

impl ExpressionParser for UnquotingParser {
    fn selectors(&self, expression: &str) -> Result<BTreeSet<String>, ParseError> {
        if expression == "dashed_name" {
            return Ok(BTreeSet::from(["http.requests-total".to_string()]));
        }
        PromqlParser.selectors(expression)
    }

    fn validate(&self, query: &str) -> Result<(), ParseError> {
        PromqlParser.validate(query)
    }
}

struct Harness {
    rules: Arc<ScriptedRules>,
    backend: Arc<ScriptedBackend>,
    sink: Arc<RecordingSink>,
    reporter: Arc<CountingReporter>,
    reconciler: Reconciler,
}

fn target() -> Target {
    Target {
        rule_url: "http://vmalert:8880".into(),
        query_url: "http://vmselect:8481".into(),
        label_values: vec!["prod".into()],
    }
}

fn harness(
    rules: Arc<ScriptedRules>,
    backend: Arc<ScriptedBackend>,
    ladder: &[&str],
    parser: Arc<dyn ExpressionParser>,
) -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let reporter = Arc::new(CountingReporter::default());
    let reconciler = Reconciler::new(
        target(),
        Arc::new(WindowLadder::parse(ladder).unwrap()),
        Duration::from_secs(300),
        Collaborators {
            rules: rules.clone(),
            backend: backend.clone(),
            parser,
            sink: sink.clone(),
            reporter: reporter.clone(),
        },
    );
    Harness {
        rules,
        backend,
        sink,
        reporter,
        reconciler,
    }
}

fn standard(rules: Vec<Rule>, present: &[&str], ladder: &[&str]) -> Harness {
    harness(
        ScriptedRules::ok(rules),
        ScriptedBackend::new(present),
        ladder,
        Arc::new(PromqlParser),
    )
}

#[tokio::test]
async fn absent_selector_makes_rule_invalid() {
    let h = standard(vec![Rule::alerting("1", "Down", "up == 0")], &[], &["0s", "1h"]);

    let summary = h.reconciler.run_pass().await.unwrap();

    assert_eq!(summary.verdicts_published, 1);
    assert_eq!(h.sink.verdict("1", "0s-1h"), Some(false));
    assert_eq!(h.backend.queries(), vec!["present_over_time(up[1h])"]);
}

#[tokio::test]
async fn present_selector_makes_rule_valid() {
    let h = standard(vec![Rule::alerting("1", "Down", "up == 0")], &["up"], &["0s", "1h"]);

    h.reconciler.run_pass().await.unwrap();

    assert_eq!(h.sink.verdict("1", "0s-1h"), Some(true));
}

#[tokio::test]
async fn ladder_of_three_boundaries_checks_two_windows() {
    let h = standard(
        vec![Rule::alerting("1", "Down", "up == 0")],
        &["up"],
        &["1h", "10h", "1d"],
    );

    let summary = h.reconciler.run_pass().await.unwrap();

    assert_eq!(summary.verdicts_published, 2);
    assert_eq!(
        h.backend.queries(),
        vec![
            "present_over_time(up[9h] offset 1h)",
            "present_over_time(up[14h] offset 10h)",
        ]
    );
    let windows: Vec<String> = h
        .sink
        .verdicts()
        .iter()
        .map(|v| v.window.to_string())
        .collect();
    assert_eq!(windows, vec!["1h-10h", "10h-1d"]);
}

#[tokio::test]
async fn repeated_selector_in_one_rule_is_probed_once_per_window() {
    let h = standard(
        vec![Rule::alerting(
            "1",
            "Drop",
            "rate(x_total[5m]) < 0.5 * rate(x_total[1h] offset 1d)",
        )],
        &["x_total"],
        &["0s", "1h", "1d"],
    );

    let summary = h.reconciler.run_pass().await.unwrap();

    assert_eq!(h.backend.count_for("x_total"), 2);
    assert_eq!(summary.probes, 2);
}

#[tokio::test]
async fn selector_shared_by_rules_is_reused_from_cache() {
    let h = standard(
        vec![
            Rule::alerting("1", "A", r#"up{job="api"} == 0"#),
            Rule::alerting("2", "B", r#"absent(up{job="api"}) or rate(errors_total[5m]) > 1"#),
        ],
        &[r#"up{job="api"}"#],
        &["0s", "1h"],
    );

    let summary = h.reconciler.run_pass().await.unwrap();

    assert_eq!(h.backend.count_for(r#"up{job="api"}"#), 1);
    assert_eq!(summary.cache_hits, 1);
    assert_eq!(h.sink.verdict("1", "0s-1h"), Some(true));
    // errors_total has no data, so rule 2 fails even though up is present.
    assert_eq!(h.sink.verdict("2", "0s-1h"), Some(false));
}

#[tokio::test]
async fn each_pass_starts_with_an_empty_cache() {
    let h = standard(vec![Rule::alerting("1", "Down", "up == 0")], &["up"], &["0s", "1h"]);

    h.reconciler.run_pass().await.unwrap();
    h.reconciler.run_pass().await.unwrap();

    assert_eq!(h.backend.count_for("up"), 2);
    assert_eq!(h.sink.passes.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn window_is_valid_only_when_all_selectors_are_present() {
    let h = standard(
        vec![Rule::alerting("1", "Ratio", "errors_total / requests_total > 0.1")],
        &["requests_total"],
        &["0s", "1h"],
    );

    h.reconciler.run_pass().await.unwrap();

    assert_eq!(h.sink.verdict("1", "0s-1h"), Some(false));
}

#[tokio::test]
async fn rule_without_selectors_is_valid_everywhere() {
    let h = standard(
        vec![Rule::alerting("1", "Always", "vector(1) > 0")],
        &[],
        &["0s", "1h", "1d"],
    );

    h.reconciler.run_pass().await.unwrap();

    assert!(h.backend.queries().is_empty());
    assert_eq!(h.sink.verdict("1", "0s-1h"), Some(true));
    assert_eq!(h.sink.verdict("1", "1h-1d"), Some(true));
}

#[tokio::test]
async fn non_alerting_and_unparsable_rules_are_skipped() {
    let recording = Rule {
        id: "r".into(),
        name: "job:up:sum".into(),
        expression: "sum(up) by (job)".into(),
        kind: RuleKind::Recording,
    };
    let h = standard(
        vec![
            recording,
            Rule::alerting("bad", "Broken", "sum(up{job=}"),
            Rule::alerting("ok", "Fine", "up == 0"),
        ],
        &["up"],
        &["0s", "1h"],
    );

    let summary = h.reconciler.run_pass().await.unwrap();

    assert_eq!(summary.rules_fetched, 3);
    assert_eq!(summary.rules_evaluated, 1);
    let ids: Vec<String> = h.sink.verdicts().into_iter().map(|v| v.rule_id).collect();
    assert_eq!(ids, vec!["ok"]);
}

#[tokio::test]
async fn backend_error_counts_as_absent_and_is_reported() {
    let h = harness(
        ScriptedRules::ok(vec![Rule::alerting("1", "Down", "up == 0")]),
        ScriptedBackend::with_failures(&["up"], &["up"]),
        &["0s", "1h"],
        Arc::new(PromqlParser),
    );

    let summary = h.reconciler.run_pass().await.unwrap();

    assert!(!summary.fetch_failed);
    assert_eq!(h.sink.verdict("1", "0s-1h"), Some(false));
    assert_eq!(h.reporter.count(ApiKind::Query), 1);
    assert_eq!(
        h.reporter.errors.lock().unwrap()[0].1,
        "http://vmselect:8481"
    );
}

#[tokio::test]
async fn rule_fetch_failure_publishes_nothing() {
    let h = harness(
        ScriptedRules::failing(),
        ScriptedBackend::new(&["up"]),
        &["0s", "1h"],
        Arc::new(PromqlParser),
    );

    let summary = h.reconciler.run_pass().await.unwrap();

    assert!(summary.fetch_failed);
    assert!(h.sink.verdicts().is_empty());
    assert!(h.sink.passes.lock().unwrap().is_empty());
    assert!(h.backend.queries().is_empty());
    assert_eq!(h.reporter.count(ApiKind::Rule), 1);
}

#[tokio::test(start_paused = true)]
async fn loop_keeps_running_after_fetch_failures() {
    let h = harness(
        ScriptedRules::failing(),
        ScriptedBackend::new(&[]),
        &["0s", "1h"],
        Arc::new(PromqlParser),
    );
    let rules = h.rules.clone();
    let reporter = h.reporter.clone();

    let handle = tokio::spawn(h.reconciler.run());
    tokio::time::sleep(Duration::from_secs(11 * 60)).await;
    handle.abort();

    assert!(rules.calls.load(Ordering::SeqCst) >= 2);
    assert!(reporter.count(ApiKind::Rule) >= 2);
}

#[tokio::test]
async fn invalid_check_query_is_fatal() {
    let h = harness(
        ScriptedRules::ok(vec![Rule::alerting("1", "Down", "up == 0")]),
        ScriptedBackend::new(&["up"]),
        &["0s", "1h"],
        Arc::new(RejectingParser),
    );

    let err = h.reconciler.run_pass().await.unwrap_err();

    let EngineError::InvalidCheckQuery { query, .. } = &err;
    assert_eq!(query, "present_over_time(up[1h])");
    assert!(h.backend.queries().is_empty());
    assert!(h.sink.verdicts().is_empty());
}

#[tokio::test]
async fn run_returns_fatal_error() {
    let h = harness(
        ScriptedRules::ok(vec![Rule::alerting("1", "Down", "up == 0")]),
        ScriptedBackend::new(&["up"]),
        &["0s", "1h"],
        Arc::new(RejectingParser),
    );

    assert!(h.reconciler.run().await.is_err());
}

#[tokio::test]
async fn republishing_yields_identical_verdicts() {
    let h = standard(vec![Rule::alerting("1", "Down", "up == 0")], &["up"], &["0s", "1h"]);

    h.reconciler.run_pass().await.unwrap();
    h.reconciler.run_pass().await.unwrap();

    let verdicts = h.sink.verdicts();
    assert_eq!(verdicts.len(), 2);
    assert_eq!(verdicts[0], verdicts[1]);
}

#[tokio::test]
async fn quoted_metric_and_label_names_are_probed_verbatim() {
    let h = standard(
        vec![
            Rule::alerting("1", "Spaced", r#"{"my metric"} == 0"#),
            Rule::alerting("2", "Dashed", r#"{__name__="http.requests-total"} > 5"#),
            Rule::alerting("3", "Label", r#"up{"label with space"="x"} == 0"#),
            Rule::alerting("4", "Down", "up == 0"),
        ],
        &[r#"{"my metric"}"#, "up"],
        &["0s", "1h"],
    );

    let summary = h.reconciler.run_pass().await.unwrap();

    assert_eq!(summary.rules_evaluated, 4);
    assert_eq!(
        h.backend.queries(),
        vec![
            r#"present_over_time({"my metric"}[1h])"#,
            r#"present_over_time({"http.requests-total"}[1h])"#,
            r#"present_over_time(up{"label with space"="x"}[1h])"#,
            "present_over_time(up[1h])",
        ]
    );
    assert_eq!(h.sink.verdict("1", "0s-1h"), Some(true));
    assert_eq!(h.sink.verdict("2", "0s-1h"), Some(false));
    assert_eq!(h.sink.verdict("3", "0s-1h"), Some(false));
    assert_eq!(h.sink.verdict("4", "0s-1h"), Some(true));
}

#[tokio::test]
async fn selector_that_does_not_read_back_skips_only_its_rule() {
    let h = harness(
        ScriptedRules::ok(vec![
            Rule::alerting("1", "Dashed", "dashed_name"),
            Rule::alerting("2", "Down", "up == 0"),
        ]),
        ScriptedBackend::new(&["up"]),
        &["0s", "1h"],
        Arc::new(UnquotingParser),
    );

    let summary = h.reconciler.run_pass().await.unwrap();

    assert_eq!(summary.rules_evaluated, 1);
    assert_eq!(h.backend.queries(), vec!["present_over_time(up[1h])"]);
    assert_eq!(h.sink.verdict("1", "0s-1h"), None);
    assert_eq!(h.sink.verdict("2", "0s-1h"), Some(true));
}

#[tokio::test]
async fn deeply_nested_rule_is_skipped() {
    let nested = format!("{}up{} == 0", "(".repeat(10_000), ")".repeat(10_000));
    let h = standard(
        vec![
            Rule::alerting("1", "Nested", &nested),
            Rule::alerting("2", "Down", "up == 0"),
        ],
        &["up"],
        &["0s", "1h"],
    );

    let summary = h.reconciler.run_pass().await.unwrap();

    assert_eq!(summary.rules_evaluated, 1);
    assert_eq!(h.sink.verdict("2", "0s-1h"), Some(true));
}
