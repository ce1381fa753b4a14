//! Completion API implementations

pub mod openai;

pub use openai::OpenAIProvider;

use crate::{ChunkStream, CompletionRequest, Error, Result};
use async_trait::async_trait;

/// Trait for hosted completion APIs
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Stream a response chunk by chunk
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream>;

    /// Run a one-shot completion and return the full response text
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Get an API key from a provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }

    std::env::var(env_var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or(Error::InvalidApiKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provided_key_wins() {
        let key = get_api_key(Some("sk-test"), "TALLY_TEST_UNSET_KEY_VAR").unwrap();
        assert_eq!(key, "sk-test");
    }

    #[test]
    fn test_missing_key() {
        let err = get_api_key(None, "TALLY_TEST_UNSET_KEY_VAR").unwrap_err();
        assert!(matches!(err, Error::InvalidApiKey));
    }

    #[test]
    fn test_blank_key_is_missing() {
        let err = get_api_key(Some("  "), "TALLY_TEST_UNSET_KEY_VAR").unwrap_err();
        assert!(matches!(err, Error::InvalidApiKey));
    }
}
