//! PromQL / MetricsQL expression parsing.
//!
//! Only the syntax tree is produced; nothing here evaluates queries. The
//! main consumer is selector extraction: [`selectors`] returns the
//! canonical text of every metric selector an expression reads.

pub mod ast;
pub mod lexer;
mod parser;


use std::collections::BTreeSet;

pub use ast::Expr;
pub use parser::parse;

/// Syntax error with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (at byte {offset})")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Parses `input` and returns its distinct metric selectors in canonical
/// form (`name{label="value", ...}`), sorted.
pub fn selectors(input: &str) -> Result<BTreeSet<String>, ParseError> {
    Ok(parse(input)?.selectors())
}
