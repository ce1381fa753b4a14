//! Popups: a list selector and a yes/no confirmation

use crate::Theme;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{
        Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, Paragraph,
        StatefulWidget, Widget, Wrap,
    },
};
use unicode_width::UnicodeWidthStr;

const MAX_POPUP_WIDTH: u16 = 80;
const MAX_POPUP_HEIGHT: u16 = 20;

/// Center a `width` x `height` rect inside `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn popup_block<'a>(title: &str, theme: &Theme) -> Block<'a> {
    Block::default()
        .title(format!(" {title} "))
        .title_style(theme.accent_bold())
        .borders(Borders::ALL)
        .border_style(theme.accent_style())
}

/// An entry in a selector popup
#[derive(Debug, Clone)]
pub struct SelectorItem {
    pub label: String,
    /// Shown dimmed after the label
    pub description: Option<String>,
    /// Marks the value currently in effect
    pub is_current: bool,
}

impl SelectorItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: None,
            is_current: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn current(mut self, is_current: bool) -> Self {
        self.is_current = is_current;
        self
    }
}

/// Popup list for picking one item
pub struct Selector<'a> {
    title: &'a str,
    items: &'a [SelectorItem],
    selected: usize,
    theme: &'a Theme,
}

impl<'a> Selector<'a> {
    pub fn new(title: &'a str, items: &'a [SelectorItem], theme: &'a Theme) -> Self {
        Self {
            title,
            items,
            selected: 0,
            theme,
        }
    }

    pub fn with_selected(mut self, index: usize) -> Self {
        self.selected = index.min(self.items.len().saturating_sub(1));
        self
    }

    fn popup_size(&self) -> (u16, u16) {
        let widest = self
            .items
            .iter()
            .map(|item| {
                item.label.width() + item.description.as_deref().map_or(0, |d| d.width() + 3) + 6
            })
            .max()
            .unwrap_or(0)
            .max(self.title.width() + 4);
        let width = (widest.min(MAX_POPUP_WIDTH as usize) as u16).max(20);
        let height = (self.items.len() as u16 + 2).min(MAX_POPUP_HEIGHT);
        (width, height)
    }

    /// Render centered in `area`, clearing what is underneath
    pub fn render_centered(&self, area: Rect, buf: &mut Buffer) {
        let (width, height) = self.popup_size();
        let popup = centered(area, width, height);
        Clear.render(popup, buf);

        let items: Vec<ListItem> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let style = if i == self.selected {
                    self.theme.selected_style()
                } else if item.is_current {
                    self.theme.accent_style()
                } else {
                    self.theme.base_style()
                };
                let prefix = if item.is_current { "● " } else { "  " };
                let mut spans = vec![Span::styled(format!("{prefix}{}", item.label), style)];
                if let Some(desc) = &item.description {
                    spans.push(Span::styled(format!("  {desc}"), self.theme.dim_style()));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let list = List::new(items)
            .block(popup_block(self.title, self.theme))
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        state.select(Some(self.selected));
        StatefulWidget::render(list, popup, buf, &mut state);
    }
}

/// Visibility and cursor for a selector popup
#[derive(Debug, Default)]
pub struct SelectorState {
    pub selected: usize,
    pub visible: bool,
}

impl SelectorState {
    /// Show with the cursor on `selected`
    pub fn show(&mut self, selected: usize) {
        self.selected = selected;
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Move up, wrapping to the end
    pub fn up(&mut self, item_count: usize) {
        if item_count == 0 {
            return;
        }
        self.selected = if self.selected > 0 {
            self.selected - 1
        } else {
            item_count - 1
        };
    }

    /// Move down, wrapping to the start
    pub fn down(&mut self, item_count: usize) {
        if item_count == 0 {
            return;
        }
        self.selected = if self.selected + 1 < item_count {
            self.selected + 1
        } else {
            0
        };
    }
}

/// Yes/no question shown over the screen
pub struct ConfirmPrompt<'a> {
    title: &'a str,
    message: &'a str,
    theme: &'a Theme,
}

impl<'a> ConfirmPrompt<'a> {
    pub fn new(title: &'a str, message: &'a str, theme: &'a Theme) -> Self {
        Self {
            title,
            message,
            theme,
        }
    }
}

impl Widget for ConfirmPrompt<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let width = (self.message.width() as u16 + 4).clamp(30, 60);
        let body_width = width.saturating_sub(2).max(1) as usize;
        let body_rows = textwrap::wrap(self.message, body_width).len() as u16;
        let popup = centered(area, width, body_rows + 4);
        Clear.render(popup, buf);

        let lines = vec![
            Line::from(Span::styled(self.message.to_string(), self.theme.base_style())),
            Line::from(""),
            Line::from(vec![
                Span::styled("y", self.theme.accent_bold()),
                Span::styled(" confirm   ", self.theme.dim_style()),
                Span::styled("n", self.theme.accent_bold()),
                Span::styled(" cancel", self.theme.dim_style()),
            ]),
        ];
        Paragraph::new(lines)
            .block(popup_block(self.title, self.theme).border_style(self.theme.warning_style()))
            .wrap(Wrap { trim: true })
            .render(popup, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wraps() {
        let mut state = SelectorState::default();
        state.up(3);
        assert_eq!(state.selected, 2);
        state.down(3);
        assert_eq!(state.selected, 0);
        state.down(0);
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn test_show_sets_cursor() {
        let mut state = SelectorState::default();
        state.show(4);
        assert!(state.visible);
        assert_eq!(state.selected, 4);
        state.hide();
        assert!(!state.visible);
    }

    #[test]
    fn test_popup_size_fits_descriptions() {
        let theme = Theme::dark();
        let items = vec![
            SelectorItem::new("gpt-4o").description("$5.00 / $15.00 per 1M"),
            SelectorItem::new("gpt-4o-mini").current(true),
        ];
        let selector = Selector::new("Model", &items, &theme);
        let (width, height) = selector.popup_size();
        assert_eq!(height, 4);
        assert!(width as usize >= "gpt-4o".len() + "$5.00 / $15.00 per 1M".len());
    }

    #[test]
    fn test_centered_clamps_to_area() {
        let area = Rect::new(0, 0, 10, 5);
        assert_eq!(centered(area, 20, 20), area);
        assert_eq!(centered(Rect::new(0, 0, 40, 20), 20, 10), Rect::new(10, 5, 20, 10));
    }

    #[test]
    fn test_confirm_renders_inside_buffer() {
        let theme = Theme::dark();
        let area = Rect::new(0, 0, 60, 20);
        let mut buf = Buffer::empty(area);
        ConfirmPrompt::new("Delete", "Delete thread \"Notes\"?", &theme).render(area, &mut buf);
        let text: String = buf.content.iter().map(|c| c.symbol()).collect();
        assert!(text.contains("Delete thread"));
    }
}
