use alertcheck_promql::ParseError;
use std::collections::BTreeSet;

/// Parses query expressions on behalf of the engine.
pub trait ExpressionParser: Send + Sync {
    /// Distinct canonical selectors referenced by `expression`.
    fn selectors(&self, expression: &str) -> Result<BTreeSet<String>, ParseError>;

    /// Checks that `query` is syntactically valid.
    fn validate(&self, query: &str) -> Result<(), ParseError>;
}

/// [`ExpressionParser`] backed by the PromQL / MetricsQL parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromqlParser;

impl ExpressionParser for PromqlParser {
    fn selectors(&self, expression: &str) -> Result<BTreeSet<String>, ParseError> {
        alertcheck_promql::selectors(expression)
    }

    fn validate(&self, query: &str) -> Result<(), ParseError> {
        alertcheck_promql::parse(query).map(|_| ())
    }
}

/// Extracts the selectors of a rule expression. A parse failure is logged
/// and yields `None`; the caller skips the rule for this pass.
///
/// Every selector must also parse back to exactly itself. A selector that
/// does not would produce a check query probing something other than what
/// the rule reads, so the rule is skipped the same way.
pub fn extract_selectors(
    parser: &dyn ExpressionParser,
    rule_name: &str,
    expression: &str,
) -> Option<BTreeSet<String>> {
    let selectors = match parser.selectors(expression) {
        Ok(selectors) => selectors,
        Err(e) => {
            tracing::warn!(alertname = %rule_name, error = %e, "Failed to parse rule expression, skipping");
            return None;
        }
    };

    for selector in &selectors {
        let reparsed = parser.selectors(selector);
        let round_trips = matches!(&reparsed, Ok(set) if set.len() == 1 && set.contains(selector));
        if !round_trips {
            tracing::warn!(
                alertname = %rule_name,
                vector = %selector,
                "Selector does not render back to itself, skipping"
            );
            return None;
        }
    }
    Some(selectors)
}
