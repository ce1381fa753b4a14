//! Sidebar listing the conversation threads

use crate::theme::Theme;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

/// A thread as shown in the sidebar
#[derive(Debug, Clone)]
pub struct ThreadEntry {
    pub title: String,
    /// Preformatted running total, e.g. "¥1.23"
    pub total_label: Option<String>,
    pub is_active: bool,
}

/// Fit `text` into `width` columns, cutting with an ellipsis
fn fit(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

/// Thread sidebar; the active entry is highlighted
pub struct ThreadList<'a> {
    entries: &'a [ThreadEntry],
    theme: &'a Theme,
    focused: bool,
}

impl<'a> ThreadList<'a> {
    pub fn new(entries: &'a [ThreadEntry], theme: &'a Theme) -> Self {
        Self {
            entries,
            theme,
            focused: false,
        }
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    fn lines(&self, width: usize) -> Vec<Line<'static>> {
        let mut lines = Vec::with_capacity(self.entries.len() * 2);
        for (i, entry) in self.entries.iter().enumerate() {
            let marker = if entry.is_active { "▸" } else { " " };
            let label = fit(&format!("{marker}{} {}", i + 1, entry.title), width);
            let style = if entry.is_active {
                self.theme.selected_style()
            } else {
                self.theme.base_style()
            };
            let padding = " ".repeat(width.saturating_sub(label.width()));
            lines.push(Line::from(Span::styled(format!("{label}{padding}"), style)));
            if let Some(total) = &entry.total_label {
                lines.push(Line::from(Span::styled(
                    fit(&format!("   {total}"), width),
                    self.theme.cost_style(),
                )));
            }
        }
        lines
    }
}

impl Widget for ThreadList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::RIGHT)
            .title(" Threads ")
            .border_style(if self.focused {
                self.theme.accent_style()
            } else {
                self.theme.border_style()
            });
        let inner = block.inner(area);
        block.render(area, buf);
        if inner.width == 0 || inner.height == 0 {
            return;
        }

        if self.entries.is_empty() {
            Paragraph::new("No threads\nCtrl+N to start")
                .style(self.theme.dim_style())
                .render(inner, buf);
            return;
        }

        let lines = self.lines(inner.width as usize);
        // Keep the active thread in view
        let active_row = self
            .entries
            .iter()
            .take_while(|e| !e.is_active)
            .map(|e| 1 + usize::from(e.total_label.is_some()))
            .sum::<usize>();
        let offset = (active_row + 2).saturating_sub(inner.height as usize);

        Paragraph::new(lines)
            .scroll((offset.min(u16::MAX as usize) as u16, 0))
            .render(inner, buf);
    }
}
