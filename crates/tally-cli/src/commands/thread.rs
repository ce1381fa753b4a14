//! Thread commands and summaries

use super::CommandResult;
use crate::utils::truncate_chars;
use tally_chat::{ConversationStore, format_amount};

pub struct ThreadCommand;

/// Parse a 1-based thread number
fn parse_number(args: &str) -> Result<usize, String> {
    match args.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("'{}' is not a thread number (threads start at 1)", args)),
    }
}

impl ThreadCommand {
    pub fn delete(args: &str) -> CommandResult {
        if args.is_empty() {
            return CommandResult::DeleteThread(None);
        }
        match parse_number(args) {
            Ok(index) => CommandResult::DeleteThread(Some(index)),
            Err(msg) => CommandResult::Message(msg),
        }
    }

    pub fn switch(args: &str) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message("Usage: /switch <n>".to_string());
        }
        match parse_number(args) {
            Ok(index) => CommandResult::SwitchThread(index),
            Err(msg) => CommandResult::Message(msg),
        }
    }

    /// Numbered thread list, active thread marked
    pub fn list_text(store: &ConversationStore, currency: &str) -> String {
        if store.is_empty() {
            return "No threads yet. Type a message or /new to start one.".to_string();
        }

        let mut output = String::new();
        for (i, thread) in store.threads().iter().enumerate() {
            let marker = if store.active() == Some(i) { "*" } else { " " };
            output.push_str(&format!(
                "{}{:>3}  {:<24} {:>3} turns  {}\n",
                marker,
                i + 1,
                truncate_chars(&thread.title, 24),
                thread.turns.len(),
                format_amount(thread.total_cost(), currency)
            ));
        }
        output.pop();
        output
    }

    /// Cost of the active thread and of everything stored
    pub fn cost_text(store: &ConversationStore, currency: &str) -> String {
        let all: f64 = store.threads().iter().map(|t| t.total_cost()).sum();
        match store.active_thread() {
            Some(thread) => format!(
                "This thread: {}\nAll threads: {}",
                format_amount(thread.total_cost(), currency),
                format_amount(all, currency)
            ),
            None => format!("All threads: {}", format_amount(all, currency)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_chat::Turn;

    fn store() -> ConversationStore {
        let mut store = ConversationStore::new();
        store.add_thread();
        store.commit_turn(0, Turn::user("hi", "gpt-4o")).unwrap();
        store.commit_turn(0, Turn::assistant("hello", "gpt-4o", 1.25)).unwrap();
        store.set_title(0, "Greetings").unwrap();
        store.add_thread();
        store
    }

    #[test]
    fn test_numbers_are_one_based() {
        assert_eq!(ThreadCommand::switch("1"), CommandResult::SwitchThread(0));
        assert_eq!(ThreadCommand::delete("3"), CommandResult::DeleteThread(Some(2)));
        assert!(matches!(ThreadCommand::switch("0"), CommandResult::Message(_)));
        assert!(matches!(ThreadCommand::delete("x"), CommandResult::Message(_)));
    }

    #[test]
    fn test_list_text() {
        let text = ThreadCommand::list_text(&store(), "JPY");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("*  1  New Chat"));
        assert!(lines[1].contains("Greetings"));
        assert!(lines[1].ends_with("¥1.25"));
    }

    #[test]
    fn test_cost_text() {
        let mut store = store();
        store.select(1).unwrap();
        assert_eq!(
            ThreadCommand::cost_text(&store, "JPY"),
            "This thread: ¥1.25\nAll threads: ¥1.25"
        );
        assert!(ThreadCommand::list_text(&ConversationStore::new(), "JPY").starts_with("No threads"));
    }
}
