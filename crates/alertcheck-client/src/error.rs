/// Longest response body kept in an error message.
pub const MAX_BODY_LENGTH: usize = 512;

/// Failure talking to a rule or query endpoint.
///
/// # Examples
///
/// ```rust
/// use alertcheck_client::error::ApiError;
///
/// let err = ApiError::Http {
///     url: "http://vmselect:8481/api/v1/query".to_string(),
///     status: 503,
///     body: "overloaded".to_string(),
/// };
/// assert!(err.to_string().contains("503"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request could not be sent or its body not read.
    #[error("{url} unavailable: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx status code.
    #[error("{url} returned HTTP {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    /// 2xx status but the body is not the expected JSON.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The API answered with `"status": "error"`.
    #[error("{url} reported an error: type={error_type}, message={message}")]
    Api {
        url: String,
        error_type: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Cuts `s` to at most `max_len` bytes on a character boundary.
pub fn truncate_body(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}
