//! Error types for tally-chat

use thiserror::Error;

/// Result type alias using tally-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing conversations
#[derive(Error, Debug)]
pub enum Error {
    /// The completion API was unreachable, refused the request, or broke off
    #[error("Network error: {0}")]
    Network(#[source] tally_ai::Error),

    /// The currency service failed or timed out
    #[error("Currency conversion failed: {0}")]
    Conversion(#[source] tally_ai::Error),

    /// The model has no entry in the pricing table
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Thread index out of range
    #[error("No thread at index {index} ({len} threads)")]
    Index { index: usize, len: usize },

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A request is already in flight
    #[error("A request is already in progress")]
    Busy,

    /// Cancelled by the user
    #[error("Request aborted")]
    Aborted,

    /// Durable storage read or write failed
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Persisted data could not be decoded
    #[error("Corrupt conversation data: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error came from talking to a remote service
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Conversion(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_display() {
        let e = Error::Index { index: 3, len: 2 };
        assert_eq!(e.to_string(), "No thread at index 3 (2 threads)");
    }

    #[test]
    fn test_remote_errors() {
        assert!(Error::Network(tally_ai::Error::Sse("reset".into())).is_remote());
        assert!(Error::Conversion(tally_ai::Error::Currency("no rate".into())).is_remote());
        assert!(!Error::Busy.is_remote());
        assert!(!Error::UnknownModel("x".into()).is_remote());
    }
}
