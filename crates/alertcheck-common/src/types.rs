use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind discriminator reported by the rule source. Only alerting rules are
/// validated.
///
/// # Examples
///
/// ```
/// use alertcheck_common::types::RuleKind;
///
/// assert_eq!(RuleKind::from("alerting"), RuleKind::Alerting);
/// assert_eq!(RuleKind::from("recording").to_string(), "recording");
/// assert!(!RuleKind::from("").is_alerting());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    Alerting,
    Recording,
    Other(String),
}

impl RuleKind {
    pub fn is_alerting(&self) -> bool {
        matches!(self, RuleKind::Alerting)
    }
}

impl From<&str> for RuleKind {
    fn from(s: &str) -> Self {
        match s {
            "alerting" => RuleKind::Alerting,
            "recording" => RuleKind::Recording,
            other => RuleKind::Other(other.to_string()),
        }
    }
}

impl From<String> for RuleKind {
    fn from(s: String) -> Self {
        RuleKind::from(s.as_str())
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Alerting => write!(f, "alerting"),
            RuleKind::Recording => write!(f, "recording"),
            RuleKind::Other(other) => write!(f, "{other}"),
        }
    }
}

/// One rule definition as served by the rule source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    /// Raw query expression (PromQL / MetricsQL).
    pub expression: String,
    pub kind: RuleKind,
}

impl Rule {
    pub fn alerting(id: &str, name: &str, expression: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            expression: expression.to_string(),
            kind: RuleKind::Alerting,
        }
    }
}

/// A monitored system: where to read its rules, where to query its data,
/// and the label values attached to every series published for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub rule_url: String,
    pub query_url: String,
    #[serde(default)]
    pub label_values: Vec<String>,
}

impl Target {
    /// Short human-readable name used in log lines.
    pub fn display_name(&self) -> String {
        if self.label_values.is_empty() {
            self.rule_url.clone()
        } else {
            self.label_values.join("/")
        }
    }
}
