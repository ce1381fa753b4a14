//! Streaming chunk types and utilities

use crate::{error::Result, types::TokenUsage};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// One incremental unit of a streamed completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Incremental text, if the chunk carried any
    pub delta: Option<String>,
    /// Final usage statistics; only ever present on the terminal chunk
    pub usage: Option<TokenUsage>,
}

impl CompletionChunk {
    /// A chunk carrying only text
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            ..Default::default()
        }
    }

    /// A terminal chunk carrying only usage
    pub fn usage(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            usage: Some(TokenUsage::new(prompt_tokens, completion_tokens)),
            ..Default::default()
        }
    }

    /// The incremental text, empty when absent
    pub fn delta_text(&self) -> &str {
        self.delta.as_deref().unwrap_or("")
    }
}

/// A stream of completion chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk>> + Send>>;

/// Build a stream that replays pre-recorded chunks in order
pub fn replay(chunks: Vec<Result<CompletionChunk>>) -> ChunkStream {
    Box::pin(tokio_stream::iter(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_delta_text_defaults_to_empty() {
        assert_eq!(CompletionChunk::usage(1, 2).delta_text(), "");
        assert_eq!(CompletionChunk::text("hi").delta_text(), "hi");
    }

    #[tokio::test]
    async fn test_replay_preserves_order() {
        let mut stream = replay(vec![
            Ok(CompletionChunk::text("a")),
            Ok(CompletionChunk::text("b")),
            Ok(CompletionChunk::usage(3, 4)),
        ]);

        let mut text = String::new();
        let mut usage = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            text.push_str(chunk.delta_text());
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
        }
        assert_eq!(text, "ab");
        assert_eq!(usage, Some(TokenUsage::new(3, 4)));
    }
}
