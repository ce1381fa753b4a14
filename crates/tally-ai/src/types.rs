//! Core types for completion requests

use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message sent as request context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token counts reported by the completion API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

/// Cost information for a model (USD per million tokens)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostInfo {
    pub input: f64,
    pub output: f64,
}

impl CostInfo {
    /// USD charged per prompt token
    pub fn input_per_token(&self) -> f64 {
        self.input / 1_000_000.0
    }

    /// USD charged per completion token
    pub fn output_per_token(&self) -> f64 {
        self.output / 1_000_000.0
    }
}

/// Model definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Cost per million tokens
    pub cost: CostInfo,
    /// Context window size in tokens
    pub context_window: u32,
}

/// A completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,
    /// Conversation context, oldest first
    pub messages: Vec<ChatMessage>,
    /// Ask the API to report token usage on the terminal chunk
    pub include_usage: bool,
}

impl CompletionRequest {
    /// Create a request without usage reporting
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            include_usage: false,
        }
    }

    /// Enable usage reporting
    pub fn with_usage(mut self) -> Self {
        self.include_usage = true;
        self
    }
}
