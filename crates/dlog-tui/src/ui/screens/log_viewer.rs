use ratatui::{
    Frame,
    layout::{Margin, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};

use crate::app::{AppState, ViewSource};
use crate::ui::components::{HelpOverlay, StatusBar, pager_hints};
use crate::ui::{Layout, Theme};

/// Log viewer screen
pub struct LogViewerScreen;

impl LogViewerScreen {
    pub fn render(frame: &mut Frame, state: &mut AppState, view: Option<&dyn ViewSource>) {
        let (header, content, status) = Layout::main(frame.area());

        Self::render_header(frame, header, state);
        Self::render_logs(frame, content, state, view);
        Self::render_status_bar(frame, status, state);

        if state.help_visible {
            HelpOverlay::render(frame);
        }
    }

    fn render_header(frame: &mut Frame, area: Rect, state: &AppState) {
        let mut spans = vec![
            Span::styled("dlog", Theme::title()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled(state.label.as_str(), Theme::text_highlight()),
        ];

        if let Some(error) = &state.error_message {
            spans.push(Span::styled(" │ ", Theme::text_dim()));
            spans.push(Span::styled(error.as_str(), Theme::error()));
        }

        let header = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border()),
        );

        frame.render_widget(header, area);
    }

    fn render_logs(
        frame: &mut Frame,
        area: Rect,
        state: &mut AppState,
        view: Option<&dyn ViewSource>,
    ) {
        // Account for the border
        let inner_height = area.height.saturating_sub(2) as usize;

        let (title, total, lines) = match view {
            Some(view) => {
                let total = view.line_count();
                state.clamp_scroll(total, inner_height);
                let lines = view
                    .lines_in(state.log_scroll, inner_height)
                    .into_iter()
                    .map(|line| Line::from(Span::styled(line, Theme::text())))
                    .collect::<Vec<_>>();
                (view.caption(), total, lines)
            }
            None => (
                state.label.clone(),
                0,
                vec![Line::from(Span::styled("loading...", Theme::text_dim()))],
            ),
        };

        let border_style = if state.auto_scroll {
            Theme::border_focused()
        } else {
            Theme::border()
        };

        let logs = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(Span::styled(format!(" {} ", title), Theme::title())),
        );
        frame.render_widget(logs, area);

        if total > inner_height {
            let mut scrollbar_state =
                ScrollbarState::new(total.saturating_sub(inner_height)).position(state.log_scroll);
            frame.render_stateful_widget(
                Scrollbar::new(ScrollbarOrientation::VerticalRight),
                area.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar_state,
            );
        }
    }

    fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let mode = if state.auto_scroll { "FOLLOW" } else { "PAUSED" };
        let right = match &state.status {
            Some(status) => format!("{} │ {}", status, mode),
            None => mode.to_string(),
        };

        frame.render_widget(StatusBar::new().hints(pager_hints()).right(right), area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlog_logs::{Document, Sink};
    use ratatui::{Terminal, backend::TestBackend};

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buf = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buf.area.height {
            for x in 0..buf.area.width {
                text.push_str(buf[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_follow_shows_newest_lines() {
        let doc = Document::new("(1/1) web (ID:abc123456789)");
        for i in 0..50 {
            doc.append(format!("line {}\n", i).as_bytes()).unwrap();
        }

        let mut terminal = Terminal::new(TestBackend::new(100, 12)).unwrap();
        let mut state = AppState::new("(1/1) web (ID:abc123456789)");

        terminal
            .draw(|frame| LogViewerScreen::render(frame, &mut state, Some(&doc as &dyn ViewSource)))
            .unwrap();

        let text = screen_text(&terminal);
        assert!(text.contains("line 49"));
        assert!(!text.contains("line 43"));
        assert!(text.contains("FOLLOW"));
        // 12 rows: header 3, status 1, log borders 2
        assert_eq!(state.log_scroll, 50 - 6);
    }

    #[test]
    fn test_without_view_shows_loading() {
        let mut terminal = Terminal::new(TestBackend::new(60, 10)).unwrap();
        let mut state = AppState::new("web");

        terminal
            .draw(|frame| LogViewerScreen::render(frame, &mut state, None))
            .unwrap();

        assert!(screen_text(&terminal).contains("loading..."));
    }
}
