//! Error types for tally-ai

use thiserror::Error;

/// Result type alias using tally-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the completion or currency services
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A call did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The currency service could not provide a rate
    #[error("Currency error: {0}")]
    Currency(String),
}

impl Error {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error means the credentials were rejected
    pub fn is_auth_error(&self) -> bool {
        match self {
            Error::InvalidApiKey => true,
            Error::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_from_status() {
        assert!(Error::api(401, "Incorrect API key provided").is_auth_error());
        assert!(Error::api(403, "forbidden").is_auth_error());
        assert!(Error::InvalidApiKey.is_auth_error());
    }

    #[test]
    fn test_not_auth_error() {
        assert!(!Error::api(429, "Rate limit reached").is_auth_error());
        assert!(!Error::api(500, "server error").is_auth_error());
        assert!(!Error::Sse("connection reset".into()).is_auth_error());
        assert!(!Error::Currency("no rate".into()).is_auth_error());
    }

    #[test]
    fn test_api_error_display() {
        let e = Error::api(400, "bad request");
        assert_eq!(e.to_string(), "API error (400): bad request");
    }
}
