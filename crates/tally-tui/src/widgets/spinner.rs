//! Activity spinner for the status bar

use crate::theme::Theme;
use ratatui::{buffer::Buffer, layout::Rect, text::Span, widgets::Widget};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_DURATION: Duration = Duration::from_millis(80);

fn frame_for(elapsed: Duration) -> &'static str {
    let index = (elapsed.as_millis() / FRAME_DURATION.as_millis()) as usize;
    SPINNER_FRAMES[index % SPINNER_FRAMES.len()]
}

/// Frame derived from wall-clock time, for widgets without their own clock
pub fn current_frame() -> &'static str {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    frame_for(since_epoch)
}

/// Spinner with a label, animated from `start`
pub struct Spinner<'a> {
    label: &'a str,
    theme: &'a Theme,
    start: Instant,
}

impl<'a> Spinner<'a> {
    pub fn new(label: &'a str, theme: &'a Theme, start: Instant) -> Self {
        Self {
            label,
            theme,
            start,
        }
    }
}

impl Widget for Spinner<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width < 3 {
            return;
        }
        let text = format!("{} {}", frame_for(self.start.elapsed()), self.label);
        let span = Span::styled(text, self.theme.accent_style());
        buf.set_span(area.x, area.y, &span, area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_cycle() {
        assert_eq!(frame_for(Duration::ZERO), "⠋");
        assert_eq!(frame_for(Duration::from_millis(85)), "⠙");
        assert_eq!(frame_for(FRAME_DURATION * SPINNER_FRAMES.len() as u32), "⠋");
    }
}
