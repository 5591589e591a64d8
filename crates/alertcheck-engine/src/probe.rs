use crate::error::{EngineError, Result};
use crate::extract::ExpressionParser;
use crate::source::{ApiKind, ErrorReporter, QueryBackend};
use alertcheck_common::types::Target;
use alertcheck_common::window::Window;

/// Builds the presence-check query for `selector` over `window`.
///
/// The range is cut down to whole minutes so the query text stays stable
/// between calls made within the same minute.
///
/// ```
/// use alertcheck_common::window::Window;
/// use alertcheck_engine::probe::check_query;
///
/// let window = Window::new("1h", "10h").unwrap();
/// assert_eq!(check_query("up", &window), "present_over_time(up[9h] offset 1h)");
///
/// let recent = Window::new("0s", "1h").unwrap();
/// assert_eq!(check_query("up", &recent), "present_over_time(up[1h])");
/// ```
pub fn check_query(selector: &str, window: &Window) -> String {
    let range = window.length().unwrap_or_default().truncate_to_minute();
    let offset = window.from_offset();
    if offset.is_zero() {
        format!("present_over_time({selector}[{range}])")
    } else {
        format!("present_over_time({selector}[{range}] offset {offset})")
    }
}

/// Asks one target's query backend whether a selector has data in a window.
pub struct ExistenceProber<'a> {
    target: &'a Target,
    backend: &'a dyn QueryBackend,
    parser: &'a dyn ExpressionParser,
    reporter: &'a dyn ErrorReporter,
}

impl<'a> ExistenceProber<'a> {
    pub fn new(
        target: &'a Target,
        backend: &'a dyn QueryBackend,
        parser: &'a dyn ExpressionParser,
        reporter: &'a dyn ErrorReporter,
    ) -> Self {
        Self {
            target,
            backend,
            parser,
            reporter,
        }
    }

    /// Backend failures count as "not present" and are reported to the
    /// error reporter. The only error returned is a generated query the
    /// parser rejects.
    pub async fn probe(&self, selector: &str, window: &Window) -> Result<bool> {
        let query = check_query(selector, window);
        if let Err(e) = self.parser.validate(&query) {
            return Err(EngineError::InvalidCheckQuery {
                query,
                message: e.to_string(),
            });
        }
        tracing::debug!(target_name = %self.target.display_name(), check = %query, "Probing selector");

        match self.backend.check_presence(&query).await {
            Ok(present) => Ok(present),
            Err(e) => {
                tracing::error!(
                    server = %self.target.query_url,
                    check = %query,
                    error = %e,
                    "Presence query failed"
                );
                self.reporter.increment(ApiKind::Query, self.target);
                Ok(false)
            }
        }
    }
}
