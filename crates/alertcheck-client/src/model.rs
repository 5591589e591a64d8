//! Response bodies of the Prometheus-compatible HTTP API.
//!
//! Every field is optional on the wire: an empty object decodes into empty
//! defaults.

use alertcheck_common::types::{Rule, RuleKind};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RulesResponse {
    pub status: String,
    pub data: RulesData,
    pub error: String,
    #[serde(rename = "errorType")]
    pub error_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RulesData {
    pub groups: Vec<RuleGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RuleGroup {
    pub name: String,
    pub rules: Vec<ApiRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiRule {
    pub id: String,
    pub name: String,
    pub query: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<ApiRule> for Rule {
    fn from(rule: ApiRule) -> Self {
        Rule {
            id: rule.id,
            name: rule.name,
            expression: rule.query,
            kind: RuleKind::from(rule.kind),
        }
    }
}

impl RulesResponse {
    pub fn into_rules(self) -> Vec<Rule> {
        self.data
            .groups
            .into_iter()
            .flat_map(|group| group.rules)
            .map(Rule::from)
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryResponse {
    pub status: String,
    pub data: QueryData,
    pub error: String,
    #[serde(rename = "errorType")]
    pub error_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryData {
    pub result: Vec<serde_json::Value>,
}
