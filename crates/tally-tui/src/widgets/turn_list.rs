//! Turn list widget: the transcript of the active thread

use crate::theme::Theme;
use crate::widgets::markdown::render_markdown;
use crate::widgets::spinner::current_frame;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};

/// Who a displayed entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    /// Local notice (help text, command output, errors)
    Notice,
}

/// One entry in the transcript, already shaped for display
#[derive(Debug, Clone)]
pub struct TurnView {
    pub role: TurnRole,
    pub content: String,
    /// Model that produced (or was asked) this turn
    pub model: Option<String>,
    /// Preformatted cost, shown under assistant replies
    pub cost_label: Option<String>,
    pub is_streaming: bool,
    pub is_error: bool,
}

impl TurnView {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            model: None,
            cost_label: None,
            is_streaming: false,
            is_error: false,
        }
    }

    pub fn assistant(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            model: Some(model.into()),
            cost_label: None,
            is_streaming: false,
            is_error: false,
        }
    }

    /// Assistant reply still arriving
    pub fn streaming(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            is_streaming: true,
            ..Self::assistant(content, model)
        }
    }

    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Notice,
            content: content.into(),
            model: None,
            cost_label: None,
            is_streaming: false,
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::notice(content)
        }
    }

    pub fn with_cost(mut self, label: impl Into<String>) -> Self {
        self.cost_label = Some(label.into());
        self
    }
}

fn turn_lines(turn: &TurnView, theme: &Theme, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let content_width = width.saturating_sub(2).max(1);

    let (label, style, prefix) = match turn.role {
        TurnRole::User => ("You", theme.accent_bold(), "▶ "),
        TurnRole::Assistant => ("Assistant", theme.assistant_bold(), "◀ "),
        TurnRole::Notice if turn.is_error => ("Error", theme.error_style(), "✗ "),
        TurnRole::Notice => ("Notice", theme.dim_style(), "● "),
    };

    let mut header = vec![Span::styled(format!("{prefix}{label}"), style)];
    if let Some(model) = turn.model.as_deref().filter(|_| turn.role == TurnRole::Assistant) {
        header.push(Span::styled(format!(" · {model}"), theme.dim_style()));
    }
    if turn.is_streaming {
        header.push(Span::styled(" ▌", style));
    }
    lines.push(Line::from(header));

    match turn.role {
        TurnRole::Assistant if turn.is_streaming && turn.content.is_empty() => {
            lines.push(Line::from(Span::styled(
                format!("  {} thinking...", current_frame()),
                theme.warning_style(),
            )));
        }
        TurnRole::Assistant => {
            for line in render_markdown(&turn.content, theme, content_width) {
                let mut spans = vec![Span::raw("  ")];
                spans.extend(line.spans);
                lines.push(Line::from(spans));
            }
        }
        _ => {
            let content_style = if turn.is_error {
                theme.error_style()
            } else if turn.role == TurnRole::Notice {
                theme.dim_style()
            } else {
                theme.base_style()
            };
            for line in turn.content.lines() {
                for wrapped in textwrap::wrap(line, content_width) {
                    lines.push(Line::from(Span::styled(format!("  {wrapped}"), content_style)));
                }
            }
        }
    }

    if let Some(cost) = &turn.cost_label {
        lines.push(Line::from(Span::styled(format!("  {cost}"), theme.cost_style())));
    }

    lines.push(Line::from(""));
    lines
}

/// Rows a line occupies once wrapped to `width`
fn rows_for(line: &Line, width: usize) -> usize {
    line.width().div_ceil(width.max(1)).max(1)
}

/// Total rows the transcript occupies at `width`
pub fn calculate_height(turns: &[TurnView], width: usize) -> usize {
    let theme = Theme::dark();
    turns
        .iter()
        .flat_map(|t| turn_lines(t, &theme, width))
        .map(|l| rows_for(&l, width))
        .sum()
}

/// Largest useful scroll-back for a viewport
pub fn max_scroll_back(turns: &[TurnView], width: usize, height: usize) -> usize {
    calculate_height(turns, width).saturating_sub(height)
}

/// Transcript widget, pinned to the bottom unless scrolled back
pub struct TurnList<'a> {
    turns: &'a [TurnView],
    theme: &'a Theme,
    /// Rows scrolled up from the bottom
    scroll_back: usize,
    empty_hint: Option<&'a str>,
}

impl<'a> TurnList<'a> {
    pub fn new(turns: &'a [TurnView], theme: &'a Theme) -> Self {
        Self {
            turns,
            theme,
            scroll_back: 0,
            empty_hint: None,
        }
    }

    pub fn scroll_back(mut self, rows: usize) -> Self {
        self.scroll_back = rows;
        self
    }

    /// Text shown when there are no turns
    pub fn empty_hint(mut self, hint: &'a str) -> Self {
        self.empty_hint = Some(hint);
        self
    }
}

impl Widget for TurnList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        if self.turns.is_empty() {
            if let Some(hint) = self.empty_hint {
                Paragraph::new(hint)
                    .style(self.theme.dim_style())
                    .wrap(Wrap { trim: true })
                    .render(area, buf);
            }
            return;
        }

        let width = area.width as usize;
        let lines: Vec<Line> = self
            .turns
            .iter()
            .flat_map(|t| turn_lines(t, self.theme, width))
            .collect();

        let total: usize = lines.iter().map(|l| rows_for(l, width)).sum();
        let max_offset = total.saturating_sub(area.height as usize);
        let offset = max_offset.saturating_sub(self.scroll_back);

        Paragraph::new(lines)
            .style(Style::default())
            .wrap(Wrap { trim: false })
            .scroll((offset.min(u16::MAX as usize) as u16, 0))
            .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn test_assistant_turn_shows_model_and_cost() {
        let turn = TurnView::assistant("Hi there", "gpt-4o-mini").with_cost("[API cost: ¥0.12]");
        let lines = text_of(&turn_lines(&turn, &Theme::dark(), 80));
        assert_eq!(lines[0], "◀ Assistant · gpt-4o-mini");
        assert_eq!(lines[1], "  Hi there");
        assert_eq!(lines[2], "  [API cost: ¥0.12]");
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_user_turn_hides_model() {
        let mut turn = TurnView::user("question\nsecond line");
        turn.model = Some("gpt-4o".into());
        let lines = text_of(&turn_lines(&turn, &Theme::dark(), 80));
        assert_eq!(lines[0], "▶ You");
        assert_eq!(&lines[1..3], ["  question", "  second line"]);
    }

    #[test]
    fn test_streaming_placeholder() {
        let turn = TurnView::streaming("", "gpt-4o");
        let lines = text_of(&turn_lines(&turn, &Theme::dark(), 80));
        assert!(lines[0].ends_with('▌'));
        assert!(lines[1].contains("thinking"));
    }

    #[test]
    fn test_height_counts_wrapping() {
        let turns = vec![TurnView::user("word ".repeat(30))];
        // header + wrapped body + separator
        let narrow = calculate_height(&turns, 20);
        let wide = calculate_height(&turns, 200);
        assert_eq!(wide, 3);
        assert!(narrow > wide);
    }

    #[test]
    fn test_max_scroll_back() {
        let turns: Vec<TurnView> = (0..10).map(|i| TurnView::user(format!("m{i}"))).collect();
        assert_eq!(max_scroll_back(&turns, 80, 10), 20);
        assert_eq!(max_scroll_back(&turns, 80, 100), 0);
    }
}
