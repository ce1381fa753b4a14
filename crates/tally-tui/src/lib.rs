//! tally-tui: Terminal UI components
//!
//! Widgets for a multi-thread chat screen built on ratatui and crossterm:
//! a thread sidebar, a turn list with live streaming and cost lines, a
//! multi-line composer, and popups for model selection and confirmation.

pub mod input;
pub mod terminal;
pub mod theme;
pub mod widgets;

pub use terminal::TerminalSession;
pub use theme::Theme;
