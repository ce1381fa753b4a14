//! Slash commands for interactive mode

mod model;
mod thread;

pub use model::ModelCommand;
pub use thread::ThreadCommand;

/// Result of executing a slash command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Start a new thread
    NewThread,
    /// Delete a thread (zero-based); None means the active one
    DeleteThread(Option<usize>),
    /// Make a thread (zero-based) active
    SwitchThread(usize),
    /// Print the thread list
    ListThreads,
    /// Use another model for the next submits
    ChangeModel(String),
    /// Open model selector (TUI) or list models (plain mode)
    OpenModelSelector,
    /// Print cost totals
    ShowCost,
    /// Show a message to the user (not sent to the model)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command. Returns None for ordinary messages.
pub fn execute_command(input: &str, available_models: &[&str]) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next().unwrap_or("").to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "new" | "n" => CommandResult::NewThread,

        "delete" | "d" => ThreadCommand::delete(args),

        "switch" | "s" => ThreadCommand::switch(args),

        "threads" | "t" => CommandResult::ListThreads,

        "model" | "m" => ModelCommand::execute(args, available_models),

        "cost" | "c" => CommandResult::ShowCost,

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /new, /n             Start a new thread
  /delete, /d [n]      Delete thread n (default: the active one)
  /switch, /s <n>      Switch to thread n
  /threads, /t         List threads with their totals
  /model, /m [name]    List models or switch to a model
  /cost, /c            Show what the conversation has cost
  /quit, /exit, /q     Exit tally

Threads are numbered from 1, newest first."#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini"];

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(execute_command("hello /new", MODELS), None);
    }

    #[test]
    fn test_parses_commands() {
        assert_eq!(execute_command("/new", MODELS), Some(CommandResult::NewThread));
        assert_eq!(execute_command("  /Q ", MODELS), Some(CommandResult::Exit));
        assert_eq!(execute_command("/cost", MODELS), Some(CommandResult::ShowCost));
        assert_eq!(
            execute_command("/switch 2", MODELS),
            Some(CommandResult::SwitchThread(1))
        );
        assert_eq!(
            execute_command("/delete", MODELS),
            Some(CommandResult::DeleteThread(None))
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            execute_command("/frobnicate now", MODELS),
            Some(CommandResult::Unknown("frobnicate".into()))
        );
    }
}
