use alertcheck_common::types::Target;
use alertcheck_engine::source::{ApiKind, ErrorReporter, Verdict, VerdictSink};
use chrono::{DateTime, Utc};
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};

pub const VALIDITY_METRIC: &str = "alertsvalidator_validity_range";
pub const API_ERROR_METRIC: &str = "alertsvalidator_external_api_error";
pub const LAST_PASS_METRIC: &str = "alertsvalidator_last_pass_timestamp_seconds";

/// Prometheus exposition of verdicts and API failures.
///
/// Every series carries the configured label keys after its own labels,
/// valued from the target's `label_values`.
pub struct Exporter {
    registry: Registry,
    validity: GaugeVec,
    api_errors: CounterVec,
    last_pass: GaugeVec,
}

impl Exporter {
    pub fn new(label_keys: &[String]) -> prometheus::Result<Self> {
        let validity_labels = label_names(
            &["alertname", "alertid", "range_from", "range_to", "status"],
            label_keys,
        );
        let validity = GaugeVec::new(
            Opts::new(VALIDITY_METRIC, "Alert validity over a lookback window"),
            &as_refs(&validity_labels),
        )?;

        let error_labels = label_names(&["type", "server"], label_keys);
        let api_errors = CounterVec::new(
            Opts::new(API_ERROR_METRIC, "Failed calls to rule and query APIs"),
            &as_refs(&error_labels),
        )?;

        let pass_labels = label_names(&["server"], label_keys);
        let last_pass = GaugeVec::new(
            Opts::new(
                LAST_PASS_METRIC,
                "Unix time of the last completed validation pass",
            ),
            &as_refs(&pass_labels),
        )?;

        let registry = Registry::new();
        registry.register(Box::new(validity.clone()))?;
        registry.register(Box::new(api_errors.clone()))?;
        registry.register(Box::new(last_pass.clone()))?;

        Ok(Self {
            registry,
            validity,
            api_errors,
            last_pass,
        })
    }

    /// Text exposition format of every registered series.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn set_validity(&self, target: &Target, verdict: &Verdict, status: &str, value: f64) {
        let mut values = vec![
            verdict.rule_name.as_str(),
            verdict.rule_id.as_str(),
            verdict.window.from(),
            verdict.window.to(),
            status,
        ];
        values.extend(target.label_values.iter().map(String::as_str));

        match self.validity.get_metric_with_label_values(&values) {
            Ok(gauge) => gauge.set(value),
            Err(e) => tracing::error!(alertname = %verdict.rule_name, error = %e, "Failed to set validity gauge"),
        }
    }
}

impl VerdictSink for Exporter {
    fn publish(&self, target: &Target, verdict: &Verdict) {
        let (valid, invalid) = if verdict.valid { (1.0, 0.0) } else { (0.0, 1.0) };
        self.set_validity(target, verdict, "valid", valid);
        self.set_validity(target, verdict, "invalid", invalid);
    }

    fn record_pass(&self, target: &Target, finished_at: DateTime<Utc>) {
        let mut values = vec![target.rule_url.as_str()];
        values.extend(target.label_values.iter().map(String::as_str));

        match self.last_pass.get_metric_with_label_values(&values) {
            Ok(gauge) => gauge.set(finished_at.timestamp() as f64),
            Err(e) => tracing::error!(server = %target.rule_url, error = %e, "Failed to set last pass gauge"),
        }
    }
}

impl ErrorReporter for Exporter {
    fn increment(&self, kind: ApiKind, target: &Target) {
        let server = match kind {
            ApiKind::Rule => target.rule_url.as_str(),
            ApiKind::Query => target.query_url.as_str(),
        };
        let mut values = vec![kind.as_str(), server];
        values.extend(target.label_values.iter().map(String::as_str));

        match self.api_errors.get_metric_with_label_values(&values) {
            Ok(counter) => counter.inc(),
            Err(e) => tracing::error!(server = %server, error = %e, "Failed to count API error"),
        }
    }
}

fn label_names(base: &[&str], label_keys: &[String]) -> Vec<String> {
    base.iter()
        .map(|s| s.to_string())
        .chain(label_keys.iter().cloned())
        .collect()
}

fn as_refs(labels: &[String]) -> Vec<&str> {
    labels.iter().map(String::as_str).collect()
}
