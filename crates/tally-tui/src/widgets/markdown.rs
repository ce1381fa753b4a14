//! Markdown rendering for assistant replies

use crate::theme::Theme;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Truncate to `max` display columns, appending an ellipsis when cut
fn truncate_to_width(text: &str, max: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > max.saturating_sub(1) {
            let rest: usize = text.chars().map(|c| c.width().unwrap_or(0)).sum();
            if rest <= max {
                return text.to_string();
            }
            out.push('…');
            return out;
        }
        used += w;
        out.push(c);
    }
    out
}

/// Cells of a table being parsed
#[derive(Default)]
struct TableBuf {
    rows: Vec<Vec<String>>,
    header_rows: usize,
    cell: String,
}

impl TableBuf {
    /// Aligned rows with a rule under the header, cut to `width`
    fn render<'a>(&self, theme: &Theme, width: usize) -> Vec<Line<'a>> {
        let columns = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        let widths: Vec<usize> = (0..columns)
            .map(|c| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(c))
                    .map(|cell| cell.width())
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(c, w)| {
                    let cell = row.get(c).map(String::as_str).unwrap_or("");
                    format!("{cell}{}", " ".repeat(w.saturating_sub(cell.width())))
                })
                .collect();
            let text = truncate_to_width(cells.join(" │ ").trim_end(), width);
            let style = if i < self.header_rows {
                theme.accent_bold()
            } else {
                theme.base_style()
            };
            lines.push(Line::from(Span::styled(text, style)));

            if i + 1 == self.header_rows {
                let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
                lines.push(Line::from(Span::styled(
                    truncate_to_width(&rule.join("─┼─"), width),
                    theme.dim_style(),
                )));
            }
        }
        lines
    }
}

fn flush<'a>(lines: &mut Vec<Line<'a>>, current: &mut Vec<Span<'a>>) {
    if !current.is_empty() {
        lines.push(Line::from(std::mem::take(current)));
    }
}

/// Convert markdown to styled lines. Code blocks are not wrapped; lines
/// wider than `width` are cut with an ellipsis.
pub fn render_markdown<'a>(text: &str, theme: &Theme, width: usize) -> Vec<Line<'a>> {
    let mut lines: Vec<Line<'a>> = Vec::new();
    let mut current: Vec<Span<'a>> = Vec::new();
    let mut style = theme.base_style();
    let mut in_code_block = false;
    let mut code = String::new();
    // Next number per open list; None for bullet lists
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut quote_depth = 0usize;
    let mut table: Option<TableBuf> = None;

    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    for event in Parser::new_ext(text, options) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { level, .. } => {
                    flush(&mut lines, &mut current);
                    style = match level {
                        HeadingLevel::H1 => theme
                            .accent_style()
                            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                        HeadingLevel::H2 => theme.accent_bold(),
                        _ => theme.accent_style(),
                    };
                }
                Tag::Paragraph => {
                    flush(&mut lines, &mut current);
                    if quote_depth > 0 {
                        current.push(Span::styled("│ ".repeat(quote_depth), theme.dim_style()));
                    }
                }
                Tag::BlockQuote(_) => {
                    flush(&mut lines, &mut current);
                    quote_depth += 1;
                    style = theme.dim_style().add_modifier(Modifier::ITALIC);
                }
                Tag::CodeBlock(kind) => {
                    flush(&mut lines, &mut current);
                    in_code_block = true;
                    code.clear();
                    if let CodeBlockKind::Fenced(lang) = kind {
                        if !lang.is_empty() {
                            lines.push(Line::from(Span::styled(
                                format!("  ╭ {lang}"),
                                theme.dim_style(),
                            )));
                        }
                    }
                }
                Tag::Table(_) => {
                    flush(&mut lines, &mut current);
                    table = Some(TableBuf::default());
                }
                Tag::TableHead | Tag::TableRow => {
                    if let Some(t) = table.as_mut() {
                        t.rows.push(Vec::new());
                    }
                }
                Tag::TableCell => {
                    if let Some(t) = table.as_mut() {
                        t.cell.clear();
                    }
                }
                Tag::List(start) => lists.push(start),
                Tag::Item => {
                    flush(&mut lines, &mut current);
                    let indent = "  ".repeat(lists.len().saturating_sub(1));
                    let marker = match lists.last_mut() {
                        Some(Some(n)) => {
                            let marker = format!("{indent}{n}. ");
                            *n += 1;
                            marker
                        }
                        _ => format!("{indent}• "),
                    };
                    current.push(Span::styled(marker, theme.dim_style()));
                }
                Tag::Emphasis => style = style.add_modifier(Modifier::ITALIC),
                Tag::Strong => style = style.add_modifier(Modifier::BOLD),
                Tag::Strikethrough => style = style.add_modifier(Modifier::CROSSED_OUT),
                Tag::Link { .. } => style = Style::default().fg(theme.link),
                _ => {}
            },
            Event::End(tag_end) => match tag_end {
                TagEnd::Heading(_) => {
                    flush(&mut lines, &mut current);
                    style = theme.base_style();
                }
                TagEnd::Paragraph => {
                    flush(&mut lines, &mut current);
                    if lists.is_empty() {
                        lines.push(Line::from(""));
                    }
                }
                TagEnd::BlockQuote(_) => {
                    quote_depth = quote_depth.saturating_sub(1);
                    if quote_depth == 0 {
                        style = theme.base_style();
                    }
                }
                TagEnd::CodeBlock => {
                    in_code_block = false;
                    let code_style = theme.code_style();
                    for code_line in code.lines() {
                        let shown = truncate_to_width(code_line, width.saturating_sub(2));
                        lines.push(Line::from(Span::styled(format!("  {shown}"), code_style)));
                    }
                    lines.push(Line::from(""));
                }
                TagEnd::TableHead => {
                    if let Some(t) = table.as_mut() {
                        t.header_rows = t.rows.len();
                    }
                }
                TagEnd::TableCell => {
                    if let Some(t) = table.as_mut() {
                        let cell = std::mem::take(&mut t.cell);
                        if let Some(row) = t.rows.last_mut() {
                            row.push(cell);
                        }
                    }
                }
                TagEnd::Table => {
                    if let Some(t) = table.take() {
                        lines.extend(t.render(theme, width));
                        lines.push(Line::from(""));
                    }
                }
                TagEnd::List(_) => {
                    lists.pop();
                    if lists.is_empty() {
                        lines.push(Line::from(""));
                    }
                }
                TagEnd::Item => flush(&mut lines, &mut current),
                TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                    style = if quote_depth > 0 {
                        theme.dim_style().add_modifier(Modifier::ITALIC)
                    } else {
                        theme.base_style()
                    };
                }
                _ => {}
            },
            Event::Text(text) => {
                if in_code_block {
                    code.push_str(&text);
                } else if let Some(t) = table.as_mut() {
                    t.cell.push_str(&text);
                } else {
                    current.push(Span::styled(text.to_string(), style));
                }
            }
            Event::Code(inline) if table.is_some() => {
                if let Some(t) = table.as_mut() {
                    t.cell.push_str(&inline);
                }
            }
            Event::Code(inline) => {
                current.push(Span::styled(
                    format!("`{inline}`"),
                    theme.code_style().add_modifier(Modifier::BOLD),
                ));
            }
            Event::SoftBreak => current.push(Span::raw(" ")),
            Event::HardBreak => flush(&mut lines, &mut current),
            Event::Rule => {
                flush(&mut lines, &mut current);
                lines.push(Line::from(Span::styled(
                    "─".repeat(width.clamp(3, 40)),
                    theme.dim_style(),
                )));
            }
            _ => {}
        }
    }

    flush(&mut lines, &mut current);

    while lines.last().is_some_and(|l| {
        l.spans.is_empty() || (l.spans.len() == 1 && l.spans[0].content.is_empty())
    }) {
        lines.pop();
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn test_paragraphs() {
        let lines = render_markdown("Hello, world!\n\nSecond.", &Theme::dark(), 80);
        assert_eq!(plain(&lines), vec!["Hello, world!", "", "Second."]);
    }

    #[test]
    fn test_code_block_has_language_label() {
        let md = "```rust\nfn main() {}\n```";
        let lines = plain(&render_markdown(md, &Theme::dark(), 80));
        assert_eq!(lines[0], "  ╭ rust");
        assert_eq!(lines[1], "  fn main() {}");
    }

    #[test]
    fn test_long_code_line_is_cut_on_char_boundary() {
        let md = format!("```\n{}\n```", "あ".repeat(50));
        let lines = plain(&render_markdown(&md, &Theme::dark(), 20));
        assert!(lines[0].ends_with('…'));
        assert!(lines[0].chars().count() < 20);
    }

    #[test]
    fn test_ordered_list_numbers() {
        let lines = plain(&render_markdown("1. one\n2. two\n", &Theme::dark(), 80));
        assert_eq!(lines, vec!["1. one", "2. two"]);
    }

    #[test]
    fn test_bullets_nest() {
        let lines = plain(&render_markdown("- a\n  - b\n", &Theme::dark(), 80));
        assert_eq!(lines, vec!["• a", "  • b"]);
    }

    #[test]
    fn test_table_columns_align() {
        let md = "| Model | Cost |\n|---|---|\n| gpt-4o | ¥1.50 |\n| mini | ¥0.02 |\n";
        let lines = plain(&render_markdown(md, &Theme::dark(), 80));
        assert_eq!(
            lines,
            vec![
                "Model  │ Cost",
                "───────┼──────",
                "gpt-4o │ ¥1.50",
                "mini   │ ¥0.02",
            ]
        );
    }

    #[test]
    fn test_wide_table_is_cut() {
        let md = format!("| a | b |\n|---|---|\n| {} | x |\n", "word ".repeat(20).trim());
        let lines = plain(&render_markdown(&md, &Theme::dark(), 30));
        assert!(lines.iter().all(|l| l.width() <= 30));
        assert!(lines[2].ends_with('…'));
    }

    #[test]
    fn test_strikethrough() {
        let lines = render_markdown("~~old~~ new", &Theme::dark(), 80);
        assert_eq!(plain(&lines), vec!["old new"]);
        assert!(
            lines[0].spans[0]
                .style
                .add_modifier
                .contains(Modifier::CROSSED_OUT)
        );
    }

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("exactly", 7), "exactly");
        assert_eq!(truncate_to_width("toolong", 5), "tool…");
    }
}
