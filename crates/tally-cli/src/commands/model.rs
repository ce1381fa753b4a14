//! /model command - list and switch models

use super::CommandResult;
use tally_ai::{CostInfo, models::get_model};
use tally_chat::PricingTable;

pub struct ModelCommand;

impl ModelCommand {
    /// Opens the selector with no args, or switches to the matching model
    pub fn execute(args: &str, available_models: &[&str]) -> CommandResult {
        if args.is_empty() {
            return CommandResult::OpenModelSelector;
        }
        match find_model(args, available_models) {
            Some(model) => CommandResult::ChangeModel(model.to_string()),
            None => CommandResult::Message(format!(
                "No priced model matches '{}'\nUse /model to list available models",
                args
            )),
        }
    }

    /// List priced models with their rates (plain mode)
    pub fn list_models_text(current: &str, pricing: &PricingTable) -> String {
        let ids = pricing.model_ids();
        if ids.is_empty() {
            return "No models available".to_string();
        }

        let mut output = String::from("Available models (USD per 1M tokens, in / out):\n");
        for id in ids {
            let marker = if id == current { " *" } else { "" };
            if let Some(rates) = pricing.get(id) {
                output.push_str(&format!(
                    "  {:<16} {:>7.2} / {:>7.2}{}\n",
                    id, rates.input, rates.output, marker
                ));
            }
        }
        output.push_str("\nSwitch with: /model <name>");
        output
    }
}

impl ModelCommand {
    /// One-line description for the model selector: name and context size
    /// for registered models, then the rates
    pub fn summary(id: &str, rates: &CostInfo) -> String {
        let rates = format!("${:.2} / ${:.2} per 1M", rates.input, rates.output);
        match get_model(id) {
            Some(model) => format!(
                "{} · {} context · {}",
                model.name,
                context_label(model.context_window),
                rates
            ),
            None => rates,
        }
    }
}

fn context_label(tokens: u32) -> String {
    if tokens >= 1_000_000 {
        format!("{}M", tokens / 1_000_000)
    } else {
        format!("{}k", tokens / 1_000)
    }
}

/// Exact id match first, then the first id containing the query
fn find_model<'a>(query: &str, models: &[&'a str]) -> Option<&'a str> {
    let query = query.to_lowercase();
    models
        .iter()
        .find(|m| m.to_lowercase() == query)
        .or_else(|| models.iter().find(|m| m.to_lowercase().contains(&query)))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_wins() {
        let models = ["gpt-4o-mini", "gpt-4o"];
        assert_eq!(find_model("gpt-4o", &models), Some("gpt-4o"));
        assert_eq!(find_model("MINI", &models), Some("gpt-4o-mini"));
        assert_eq!(find_model("claude", &models), None);
    }

    #[test]
    fn test_execute() {
        let models = ["gpt-4o"];
        assert_eq!(ModelCommand::execute("", &models), CommandResult::OpenModelSelector);
        assert_eq!(
            ModelCommand::execute("4o", &models),
            CommandResult::ChangeModel("gpt-4o".into())
        );
        assert!(matches!(ModelCommand::execute("o3", &models), CommandResult::Message(_)));
    }

    #[test]
    fn test_summary() {
        let table = PricingTable::from_registry();
        assert_eq!(
            ModelCommand::summary("gpt-4o-mini", table.get("gpt-4o-mini").unwrap()),
            "GPT-4o mini · 128k context · $0.15 / $0.60 per 1M"
        );
        assert_eq!(
            ModelCommand::summary("gpt-4.1", table.get("gpt-4.1").unwrap()),
            "GPT-4.1 · 1M context · $2.00 / $8.00 per 1M"
        );

        let custom = CostInfo {
            input: 0.0,
            output: 0.0,
        };
        assert_eq!(ModelCommand::summary("local-model", &custom), "$0.00 / $0.00 per 1M");
    }

    #[test]
    fn test_list_marks_current() {
        let text = ModelCommand::list_models_text("gpt-4o", &PricingTable::from_registry());
        let line = text.lines().find(|l| l.trim_start().starts_with("gpt-4o ")).unwrap();
        assert!(line.ends_with('*'));
    }
}
