//! tally-ai: clients for the services tally talks to
//!
//! This crate wraps the hosted completion API (streaming and one-shot calls),
//! the static model/pricing registry, and the currency conversion service.

pub mod currency;
pub mod error;
pub mod models;
pub mod providers;
pub mod stream;
pub mod types;

pub use currency::{CurrencyConverter, ExchangeRateConverter, FixedRateConverter};
pub use error::{Error, Result};
pub use providers::{CompletionApi, OpenAIProvider};
pub use stream::{ChunkStream, CompletionChunk};
pub use types::*;
