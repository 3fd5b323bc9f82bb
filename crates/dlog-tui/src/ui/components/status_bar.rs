use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::Widget,
};

use crate::ui::Theme;

/// Status bar showing keyboard shortcuts and a right-aligned note
pub struct StatusBar<'a> {
    hints: Vec<(&'a str, &'a str)>,
    right_text: Option<String>,
}

impl<'a> StatusBar<'a> {
    pub fn new() -> Self {
        Self {
            hints: Vec::new(),
            right_text: None,
        }
    }

    /// Add keyboard hints as (key, description) pairs
    pub fn hints<I>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.hints = hints.into_iter().collect();
        self
    }

    pub fn right<S: Into<String>>(mut self, text: S) -> Self {
        self.right_text = Some(text.into());
        self
    }
}

impl Default for StatusBar<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        buf.set_style(area, Theme::status_bar());

        let mut spans = Vec::new();
        for (i, (key, desc)) in self.hints.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled("  ", Theme::status_bar()));
            }
            spans.push(Span::styled(format!("[{}]", key), Theme::status_bar_key()));
            spans.push(Span::styled(format!(" {}", desc), Theme::status_bar()));
        }

        let line = Line::from(spans);
        let line_width = line.width() as u16;
        buf.set_line(area.x + 1, area.y, &line, area.width.saturating_sub(2));

        if let Some(right) = self.right_text {
            let width = Line::from(right.as_str()).width() as u16;
            let right_x = area.x + area.width.saturating_sub(width + 2);
            // Hints win when the bar is too narrow for both
            if right_x > area.x + line_width + 2 {
                let right_span = Span::styled(&right, Theme::status_bar());
                buf.set_span(right_x, area.y, &right_span, width);
            }
        }
    }
}

/// Hints for the log viewer
pub fn pager_hints() -> Vec<(&'static str, &'static str)> {
    vec![
        ("←/→", "Container"),
        ("↑/↓", "Scroll"),
        ("f", "Follow"),
        ("?", "Help"),
        ("q", "Quit"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(bar: StatusBar, width: u16) -> String {
        let area = Rect::new(0, 0, width, 1);
        let mut buf = Buffer::empty(area);
        bar.render(area, &mut buf);
        (0..width)
            .map(|x| buf[(x, 0)].symbol().to_string())
            .collect()
    }

    #[test]
    fn test_hints_and_right_text() {
        let text = rendered(
            StatusBar::new().hints([("q", "Quit")]).right("FOLLOW"),
            40,
        );
        assert!(text.contains("[q] Quit"));
        assert!(text.trim_end().ends_with("FOLLOW"));
    }

    #[test]
    fn test_right_text_dropped_when_narrow() {
        let text = rendered(
            StatusBar::new().hints([("q", "Quit")]).right("a long status message"),
            20,
        );
        assert!(text.contains("[q] Quit"));
        assert!(!text.contains("status"));
    }
}
