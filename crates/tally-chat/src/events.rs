//! Session event types

use serde::{Deserialize, Serialize};

use crate::store::Turn;

/// Where a submit cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Request sent, waiting for the stream to open
    Submitting,
    /// Receiving chunks
    Streaming,
    /// Stream ended; pricing and committing
    Finalizing,
    Committed,
    Failed,
}

/// Events emitted during a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A user turn was appended and a request is about to go out
    SubmitStart { thread_index: usize, user_turn: Turn },

    /// The cycle moved to a new phase
    Phase { phase: SessionPhase },

    /// New text arrived; `partial` is everything received so far
    StreamDelta { delta: String, partial: String },

    /// The assistant turn was committed
    TurnCommitted { thread_index: usize, turn: Turn },

    /// A thread got a synthesized title
    TitleChanged { thread_index: usize, title: String },

    /// The store was written to durable storage
    Persisted,

    /// The target thread was deleted before the answer could be committed
    Dropped,

    /// Error occurred
    Error { message: String },

    /// The cycle finished, successfully or not
    SubmitEnd,
}
