//! tally-chat: conversation threads, cost accounting and streaming sessions
//!
//! This crate owns the conversation store and the request/response cycle
//! that streams an answer, prices it, and commits it to the store.

pub mod cost;
pub mod error;
pub mod events;
pub mod handle;
pub mod session;
pub mod storage;
pub mod store;
pub mod title;

#[cfg(test)]
pub(crate) mod testing;

pub use cost::{CostCalculator, PricingTable, format_amount, format_cost};
pub use error::{Error, Result};
pub use events::{ChatEvent, SessionPhase};
pub use handle::SessionHandle;
pub use session::{ChatSession, SessionConfig, StreamingState, SubmitOutcome};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{ConversationStore, SharedStore, Thread, ThreadId, Turn};
pub use title::TitleSynthesizer;
