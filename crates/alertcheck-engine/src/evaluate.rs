use crate::cache::CycleCache;
use crate::error::Result;
use crate::extract::{extract_selectors, ExpressionParser};
use crate::probe::ExistenceProber;
use alertcheck_common::types::Rule;
use alertcheck_common::window::{Window, WindowLadder};
use std::collections::BTreeMap;

/// Validity of one rule over one window, with the presence of each
/// selector that went into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowValidity {
    pub window: Window,
    pub valid: bool,
    pub selectors: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleValidity {
    pub rule_id: String,
    pub rule_name: String,
    pub windows: Vec<WindowValidity>,
}

impl RuleValidity {
    /// `{"<from>-<to>": valid, ...}`
    pub fn is_valid(&self) -> BTreeMap<String, bool> {
        self.windows
            .iter()
            .map(|w| (w.window.to_string(), w.valid))
            .collect()
    }

    /// `{"<from>-<to>": {"<selector>": present, ...}, ...}`
    pub fn is_vector_present(&self) -> BTreeMap<String, &BTreeMap<String, bool>> {
        self.windows
            .iter()
            .map(|w| (w.window.to_string(), &w.selectors))
            .collect()
    }
}

/// Computes per-window validity of alerting rules over a window ladder.
pub struct WindowEvaluator<'a> {
    ladder: &'a WindowLadder,
    parser: &'a dyn ExpressionParser,
    prober: ExistenceProber<'a>,
}

impl<'a> WindowEvaluator<'a> {
    pub fn new(
        ladder: &'a WindowLadder,
        parser: &'a dyn ExpressionParser,
        prober: ExistenceProber<'a>,
    ) -> Self {
        Self {
            ladder,
            parser,
            prober,
        }
    }

    /// Returns `None` for rules that are not alerting rules or whose
    /// expression does not parse. A rule without selectors is valid in
    /// every window.
    pub async fn evaluate(
        &self,
        rule: &Rule,
        cache: &mut CycleCache,
    ) -> Result<Option<RuleValidity>> {
        if !rule.kind.is_alerting() {
            return Ok(None);
        }
        let Some(selectors) = extract_selectors(self.parser, &rule.name, &rule.expression) else {
            return Ok(None);
        };

        let mut windows = Vec::with_capacity(self.ladder.len());
        for window in self.ladder.windows() {
            let mut presence = BTreeMap::new();
            for selector in &selectors {
                let present = cache
                    .get_or_probe(selector, window, || self.prober.probe(selector, window))
                    .await?;
                presence.insert(selector.clone(), present);
            }
            windows.push(WindowValidity {
                window: window.clone(),
                valid: presence.values().all(|&present| present),
                selectors: presence,
            });
        }

        Ok(Some(RuleValidity {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            windows,
        }))
    }
}
