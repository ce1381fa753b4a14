//! Multi-line message composer

use crate::input::Action;
use crate::theme::Theme;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    text::Line,
    widgets::{Block, Borders, Paragraph, Widget},
};
use std::cell::Cell;
use unicode_width::UnicodeWidthChar;

/// Rows the composer grows to before it scrolls
const MAX_VISIBLE_ROWS: usize = 8;

/// One row on screen: a char range of the content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Row {
    start: usize,
    len: usize,
}

/// Multi-line text input with soft wrapping
#[derive(Debug)]
pub struct Composer {
    content: String,
    /// Cursor position (character index, not byte index)
    cursor: usize,
    placeholder: String,
    focused: bool,
    /// Inner width at the last render; drives wrapping for Up/Down
    last_width: Cell<usize>,
    /// First visible row at the last render
    scroll: Cell<usize>,
}

impl Default for Composer {
    fn default() -> Self {
        Self {
            content: String::new(),
            cursor: 0,
            placeholder: String::new(),
            focused: false,
            last_width: Cell::new(80),
            scroll: Cell::new(0),
        }
    }
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Replace the content and move the cursor to the end
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.cursor = self.content.chars().count();
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
        self.scroll.set(0);
    }

    /// Take the content, leaving the composer empty
    pub fn take(&mut self) -> String {
        let content = std::mem::take(&mut self.content);
        self.clear();
        content
    }

    /// Total height including borders for a given outer width
    pub fn desired_height(&self, outer_width: u16) -> u16 {
        let rows = self.layout(outer_width.saturating_sub(2) as usize).len();
        rows.clamp(1, MAX_VISIBLE_ROWS) as u16 + 2
    }

    fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.content
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len())
    }

    /// Split the content into screen rows of at most `width` columns
    fn layout(&self, width: usize) -> Vec<Row> {
        let width = width.max(1);
        let mut rows = Vec::new();
        let (mut start, mut len, mut used) = (0, 0, 0);

        for (i, c) in self.content.chars().enumerate() {
            if c == '\n' {
                rows.push(Row { start, len });
                (start, len, used) = (i + 1, 0, 0);
                continue;
            }
            let w = c.width().unwrap_or(0);
            if used + w > width && len > 0 {
                rows.push(Row { start, len });
                (start, len, used) = (i, 0, 0);
            }
            len += 1;
            used += w;
        }
        rows.push(Row { start, len });
        rows
    }

    /// Row index and display column of the cursor
    fn cursor_row_col(&self, rows: &[Row]) -> (usize, usize) {
        let row = rows
            .iter()
            .rposition(|r| r.start <= self.cursor)
            .unwrap_or(0);
        let col = self
            .content
            .chars()
            .skip(rows[row].start)
            .take(self.cursor - rows[row].start)
            .map(|c| c.width().unwrap_or(0))
            .sum();
        (row, col)
    }

    /// Char index in `row` closest to display column `col`
    fn index_at(&self, row: Row, col: usize) -> usize {
        let mut used = 0;
        for (offset, c) in self.content.chars().skip(row.start).take(row.len).enumerate() {
            let w = c.width().unwrap_or(0);
            if used + w > col {
                return row.start + offset;
            }
            used += w;
        }
        row.start + row.len
    }

    fn insert_char(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.content.insert(at, c);
        self.cursor += 1;
    }

    fn remove_range(&mut self, from: usize, to: usize) {
        let start = self.byte_offset(from);
        let end = self.byte_offset(to);
        self.content.drain(start..end);
        self.cursor = from;
    }

    /// Handle an input action; returns whether it was consumed
    pub fn handle_action(&mut self, action: &Action) -> bool {
        let width = self.last_width.get();
        match action {
            Action::Char(c) => {
                self.insert_char(*c);
                true
            }
            Action::Newline => {
                self.insert_char('\n');
                true
            }
            Action::Backspace => {
                if self.cursor == 0 {
                    return false;
                }
                self.remove_range(self.cursor - 1, self.cursor);
                true
            }
            Action::Delete => {
                if self.cursor >= self.char_count() {
                    return false;
                }
                let cursor = self.cursor;
                self.remove_range(cursor, cursor + 1);
                true
            }
            Action::Left => {
                if self.cursor == 0 {
                    return false;
                }
                self.cursor -= 1;
                true
            }
            Action::Right => {
                if self.cursor >= self.char_count() {
                    return false;
                }
                self.cursor += 1;
                true
            }
            Action::Up | Action::Down => {
                let rows = self.layout(width);
                let (row, col) = self.cursor_row_col(&rows);
                let target = match action {
                    Action::Up if row > 0 => row - 1,
                    Action::Down if row + 1 < rows.len() => row + 1,
                    _ => return false,
                };
                self.cursor = self.index_at(rows[target], col);
                true
            }
            Action::Home => {
                let rows = self.layout(width);
                let (row, _) = self.cursor_row_col(&rows);
                self.cursor = rows[row].start;
                true
            }
            Action::End => {
                let rows = self.layout(width);
                let (row, _) = self.cursor_row_col(&rows);
                self.cursor = rows[row].start + rows[row].len;
                true
            }
            Action::ClearLine => {
                self.clear();
                true
            }
            Action::DeleteWord => {
                let chars: Vec<char> = self.content.chars().collect();
                let mut start = self.cursor;
                while start > 0 && chars[start - 1].is_whitespace() {
                    start -= 1;
                }
                while start > 0 && !chars[start - 1].is_whitespace() {
                    start -= 1;
                }
                let cursor = self.cursor;
                self.remove_range(start, cursor);
                true
            }
            Action::Paste(text) => {
                for c in text.chars().filter(|c| *c != '\r') {
                    self.insert_char(c);
                }
                true
            }
            _ => false,
        }
    }

    /// Render the composer
    pub fn render(&self, area: Rect, buf: &mut Buffer, theme: &Theme, title: &str) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title.to_string())
            .border_style(if self.focused {
                theme.accent_style()
            } else {
                theme.border_style()
            });

        let inner = block.inner(area);
        block.render(area, buf);
        if inner.width == 0 || inner.height == 0 {
            return;
        }

        let width = inner.width as usize;
        self.last_width.set(width);

        if self.content.is_empty() {
            Paragraph::new(self.placeholder.as_str())
                .style(theme.dim_style())
                .render(inner, buf);
        } else {
            let rows = self.layout(width);
            let (cursor_row, _) = self.cursor_row_col(&rows);
            let visible = inner.height as usize;

            // Keep the cursor row on screen
            let mut scroll = self.scroll.get().min(rows.len().saturating_sub(1));
            if cursor_row < scroll {
                scroll = cursor_row;
            } else if cursor_row >= scroll + visible {
                scroll = cursor_row + 1 - visible;
            }
            self.scroll.set(scroll);

            let lines: Vec<Line> = rows
                .iter()
                .skip(scroll)
                .take(visible)
                .map(|r| Line::from(self.content.chars().skip(r.start).take(r.len).collect::<String>()))
                .collect();
            Paragraph::new(lines)
                .style(theme.base_style())
                .render(inner, buf);
        }

        if self.focused {
            let rows = self.layout(width);
            let (row, col) = self.cursor_row_col(&rows);
            let row = row.saturating_sub(self.scroll.get());
            if col < width && row < inner.height as usize {
                let x = inner.x + col as u16;
                let y = inner.y + row as u16;
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.set_style(Style::default().bg(theme.accent));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(text: &str) -> Composer {
        let mut composer = Composer::new();
        composer.handle_action(&Action::Paste(text.to_string()));
        composer
    }

    #[test]
    fn test_newline_and_backspace() {
        let mut composer = typed("ab");
        composer.handle_action(&Action::Newline);
        composer.handle_action(&Action::Char('c'));
        assert_eq!(composer.content(), "ab\nc");

        composer.handle_action(&Action::Backspace);
        composer.handle_action(&Action::Backspace);
        assert_eq!(composer.content(), "ab");
    }

    #[test]
    fn test_paste_drops_carriage_returns() {
        let composer = typed("one\r\ntwo");
        assert_eq!(composer.content(), "one\ntwo");
    }

    #[test]
    fn test_layout_wraps_wide_chars() {
        // Each of these takes two columns
        let composer = typed("日本語です");
        let rows = composer.layout(4);
        assert_eq!(rows, vec![
            Row { start: 0, len: 2 },
            Row { start: 2, len: 2 },
            Row { start: 4, len: 1 },
        ]);
    }

    #[test]
    fn test_layout_respects_newlines() {
        let composer = typed("a\n\nb");
        assert_eq!(composer.layout(10).len(), 3);
    }

    #[test]
    fn test_up_down_keep_column() {
        let mut composer = typed("hello\nhi\nworld");
        composer.handle_action(&Action::Up);
        assert_eq!(composer.cursor, 8); // end of "hi"
        composer.handle_action(&Action::Up);
        assert_eq!(composer.cursor, 2);
        composer.handle_action(&Action::Down);
        composer.handle_action(&Action::Down);
        assert_eq!(composer.cursor, 11);
        assert!(!composer.handle_action(&Action::Down));
    }

    #[test]
    fn test_home_end_on_row() {
        let mut composer = typed("first\nsecond");
        composer.handle_action(&Action::Home);
        assert_eq!(composer.cursor, 6);
        composer.handle_action(&Action::Up);
        composer.handle_action(&Action::End);
        assert_eq!(composer.cursor, 5);
    }

    #[test]
    fn test_delete_word() {
        let mut composer = typed("hello big world  ");
        composer.handle_action(&Action::DeleteWord);
        assert_eq!(composer.content(), "hello big ");
    }

    #[test]
    fn test_multibyte_editing() {
        let mut composer = typed("こんにちは");
        composer.handle_action(&Action::Left);
        composer.handle_action(&Action::Backspace);
        assert_eq!(composer.content(), "こんには");
        composer.handle_action(&Action::Delete);
        assert_eq!(composer.content(), "こんに");
    }

    #[test]
    fn test_take_clears() {
        let mut composer = typed("send me");
        assert_eq!(composer.take(), "send me");
        assert!(composer.is_empty());
        assert_eq!(composer.cursor, 0);
    }

    #[test]
    fn test_desired_height_is_capped() {
        let composer = typed(&"line\n".repeat(20));
        assert_eq!(composer.desired_height(40), MAX_VISIBLE_ROWS as u16 + 2);
        assert_eq!(Composer::new().desired_height(40), 3);
    }
}
