use dlog_logs::{BackfillStop, SourceEvent};

use crate::app::Action;

/// Lines moved by PageUp/PageDown before the first render sizes the view
const DEFAULT_PAGE: usize = 20;

/// View state of the pager
#[derive(Debug)]
pub struct AppState {
    /// Label of the current container
    pub label: String,

    /// First visible line
    pub log_scroll: usize,

    /// Follow mode: stick to the newest line
    pub auto_scroll: bool,

    /// Height of the log area at the last render
    pub page_size: usize,

    pub help_visible: bool,

    /// Transient message from the log source (stream ended, history progress)
    pub status: Option<String>,

    pub error_message: Option<String>,

    pub should_quit: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            label: String::new(),
            log_scroll: 0,
            auto_scroll: true,
            page_size: DEFAULT_PAGE,
            help_visible: false,
            status: None,
            error_message: None,
            should_quit: false,
        }
    }
}

impl AppState {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Apply a view action. Container switches are handled by the caller.
    pub fn apply(&mut self, action: &Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::ScrollUp(n) => {
                self.auto_scroll = false;
                self.log_scroll = self.log_scroll.saturating_sub(*n);
            }
            Action::ScrollDown(n) => {
                self.auto_scroll = false;
                // Clamped at render time against the actual line count
                self.log_scroll = self.log_scroll.saturating_add(*n);
            }
            Action::PageUp => {
                self.auto_scroll = false;
                self.log_scroll = self.log_scroll.saturating_sub(self.page_size);
            }
            Action::PageDown => {
                self.auto_scroll = false;
                self.log_scroll = self.log_scroll.saturating_add(self.page_size);
            }
            Action::ScrollToTop => {
                self.auto_scroll = false;
                self.log_scroll = 0;
            }
            Action::ScrollToBottom => {
                self.auto_scroll = false;
                self.log_scroll = usize::MAX;
            }
            Action::ToggleFollow => self.auto_scroll = !self.auto_scroll,
            Action::ToggleHelp => self.help_visible = !self.help_visible,
            Action::DismissError => self.error_message = None,
            Action::SwitchContainer(_) => {}
        }
    }

    /// Reset scrolling for a newly loaded container
    pub fn reset_view(&mut self, label: impl Into<String>) {
        self.label = label.into();
        self.log_scroll = 0;
        self.auto_scroll = true;
        self.status = None;
    }

    /// Fit the scroll offset to `total` lines shown `height` at a time
    pub fn clamp_scroll(&mut self, total: usize, height: usize) {
        self.page_size = height.max(1);

        let max_scroll = total.saturating_sub(height);
        if self.auto_scroll || self.log_scroll > max_scroll {
            self.log_scroll = max_scroll;
        }
    }

    pub fn show_error(&mut self, msg: impl Into<String>) {
        self.error_message = Some(msg.into());
    }

    /// Reflect a source event in the status line
    pub fn on_source_event(&mut self, event: &SourceEvent) {
        match event {
            SourceEvent::Started { .. } => self.status = None,
            SourceEvent::Ended { .. } => self.status = Some("stream ended".to_string()),
            SourceEvent::Failed { error, .. } => self.show_error(error.to_string()),
            SourceEvent::BackfillWindow { window, .. } => {
                self.status = Some(format!(
                    "history from {}",
                    window.since.format("%Y-%m-%d %H:%M")
                ));
            }
            SourceEvent::BackfillFinished { windows, stop, .. } => {
                self.status = Some(match stop {
                    BackfillStop::Cancelled => format!("history stopped after {} windows", windows),
                    BackfillStop::ReachedFloor => format!("history complete ({} windows)", windows),
                    BackfillStop::Failed(e) => format!("history failed: {}", e),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use dlog_logs::{Container, TimeWindow};

    #[test]
    fn test_scrolling_leaves_follow_mode() {
        let mut state = AppState::new("web");
        state.clamp_scroll(100, 10);
        assert_eq!(state.log_scroll, 90);

        state.apply(&Action::ScrollUp(5));
        assert!(!state.auto_scroll);
        assert_eq!(state.log_scroll, 85);

        state.apply(&Action::PageUp);
        assert_eq!(state.log_scroll, 75);

        state.apply(&Action::ScrollToBottom);
        state.clamp_scroll(100, 10);
        assert_eq!(state.log_scroll, 90);

        state.apply(&Action::ToggleFollow);
        state.clamp_scroll(120, 10);
        assert_eq!(state.log_scroll, 110);
    }

    #[test]
    fn test_clamp_short_document() {
        let mut state = AppState::new("web");
        state.apply(&Action::ScrollDown(50));
        state.clamp_scroll(3, 10);
        assert_eq!(state.log_scroll, 0);
    }

    #[test]
    fn test_reset_view_restores_follow() {
        let mut state = AppState::new("(1/2) web");
        state.apply(&Action::ScrollToTop);
        state.status = Some("stream ended".into());

        state.reset_view("(2/2) db");
        assert!(state.auto_scroll);
        assert_eq!(state.label, "(2/2) db");
        assert!(state.status.is_none());
    }

    #[test]
    fn test_source_events_update_status() {
        let mut state = AppState::new("web");
        let container = Container::new("abc", "/web");
        let until = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

        state.on_source_event(&SourceEvent::BackfillWindow {
            load: 1,
            container: container.clone(),
            window: TimeWindow::ending_at(until, TimeDelta::hours(24)).unwrap(),
            bytes: 10,
        });
        assert_eq!(state.status.as_deref(), Some("history from 2024-01-14 00:00"));

        state.on_source_event(&SourceEvent::Ended { load: 1, container });
        assert_eq!(state.status.as_deref(), Some("stream ended"));
    }
}
