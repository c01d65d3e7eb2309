use thiserror::Error;

pub type Result<T> = std::result::Result<T, LookupError>;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 429. The guest session is exhausted; a fresh token is needed.
    #[error("Rate limited (status 429)")]
    RateLimited,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Guest token activation returned no token")]
    MissingGuestToken,
}

impl LookupError {
    /// Whether the request can be retried with a fresh session token.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LookupError::RateLimited)
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        LookupError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for LookupError {
    fn from(err: serde_json::Error) -> Self {
        LookupError::Parse(err.to_string())
    }
}
