//! Model registry: the chat models tally knows how to price.

use crate::{CostInfo, Model};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

struct ModelEntry {
    id: &'static str,
    name: &'static str,
    /// USD per million prompt tokens
    cost_input: f64,
    /// USD per million completion tokens
    cost_output: f64,
    context_window: u32,
}

// https://openai.com/api/pricing/
const MODEL_ENTRIES: &[ModelEntry] = &[
    ModelEntry {
        id: "gpt-4o-mini",
        name: "GPT-4o mini",
        cost_input: 0.15,
        cost_output: 0.6,
        context_window: 128_000,
    },
    ModelEntry {
        id: "gpt-4o",
        name: "GPT-4o",
        cost_input: 5.0,
        cost_output: 15.0,
        context_window: 128_000,
    },
    ModelEntry {
        id: "gpt-4.1",
        name: "GPT-4.1",
        cost_input: 2.0,
        cost_output: 8.0,
        context_window: 1_047_576,
    },
    ModelEntry {
        id: "gpt-4.1-mini",
        name: "GPT-4.1 mini",
        cost_input: 0.4,
        cost_output: 1.6,
        context_window: 1_047_576,
    },
    ModelEntry {
        id: "gpt-4.1-nano",
        name: "GPT-4.1 nano",
        cost_input: 0.1,
        cost_output: 0.4,
        context_window: 1_047_576,
    },
    ModelEntry {
        id: "o4-mini",
        name: "o4-mini",
        cost_input: 1.1,
        cost_output: 4.4,
        context_window: 200_000,
    },
];

impl ModelEntry {
    fn to_model(&self) -> Model {
        Model {
            id: self.id.to_string(),
            name: self.name.to_string(),
            cost: CostInfo {
                input: self.cost_input,
                output: self.cost_output,
            },
            context_window: self.context_window,
        }
    }
}

/// Look up a model by ID.
pub fn get_model(id: &str) -> Option<Model> {
    MODEL_ENTRIES
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.to_model())
}

/// Get all registered models, in registry order.
pub fn get_all_models() -> Vec<Model> {
    MODEL_ENTRIES.iter().map(|e| e.to_model()).collect()
}
