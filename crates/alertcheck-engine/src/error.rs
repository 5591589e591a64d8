/// Errors that stop a reconciliation loop.
///
/// Everything transient (unreachable rule source, failing query backend,
/// unparsable rule expression) is absorbed inside the pass; only faults in
/// the loop's own configuration surface here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A generated presence-check query was rejected by the expression
    /// parser, which means the configured window boundaries are unusable.
    #[error("generated check query `{query}` is invalid: {message}")]
    InvalidCheckQuery { query: String, message: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
