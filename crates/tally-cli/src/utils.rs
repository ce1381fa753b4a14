//! Shared utilities

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// First line of `text`, shortened for one-line displays
pub fn preview(text: &str, max: usize) -> String {
    truncate_chars(text.lines().next().unwrap_or(""), max)
}

/// How a failed submit is reported
pub fn failure_message(error: &tally_chat::Error) -> String {
    if error.is_remote() {
        format!("{}\nNothing was saved. Send the message again to retry.", error)
    } else {
        error.to_string()
    }
}
