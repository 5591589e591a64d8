//! Validity reconciliation for alerting rules.
//!
//! For every monitored target a [`Reconciler`] periodically fetches the
//! alerting rules, extracts the metric selectors each rule reads, checks
//! whether every selector has data in each window of a [`WindowLadder`],
//! and publishes a valid/invalid verdict per rule and window.
//!
//! Network access, expression parsing and metric publication are reached
//! through the traits in [`source`] and [`extract`], so the loop can be
//! driven by scripted doubles in tests.
//!
//! [`WindowLadder`]: alertcheck_common::window::WindowLadder

pub mod cache;
pub mod error;
pub mod evaluate;
pub mod extract;
pub mod probe;
pub mod reconcile;
pub mod source;

#[cfg(test)]
mod tests;

pub use cache::CycleCache;
pub use error::{EngineError, Result};
pub use evaluate::{RuleValidity, WindowEvaluator, WindowValidity};
pub use extract::{ExpressionParser, PromqlParser};
pub use probe::{check_query, ExistenceProber};
pub use reconcile::{Collaborators, PassSummary, Reconciler};
pub use source::{ApiKind, ErrorReporter, QueryBackend, RuleSource, Verdict, VerdictSink};
