//! Shared types for dlog
//!
//! This crate contains data structures used across multiple dlog crates.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Container Types
// ============================================================================

/// Number of id characters shown in labels
pub const SHORT_ID_LEN: usize = 12;

/// A container discovered from the runtime
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Container {
    /// Opaque runtime identifier
    pub id: String,
    /// Runtime names joined with ", " (usually a single "/name")
    pub name: String,
}

impl Container {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Name without the leading slash the runtime puts on it
    pub fn display_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(&self.name)
    }

    /// First 12 characters of the id (or the whole id when shorter)
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }
}

/// Details learned from inspecting a container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    /// Whether the container was allocated a pseudo-terminal
    pub tty: bool,
    /// Creation time, if the runtime reported one
    pub created: Option<DateTime<Utc>>,
}

impl ContainerDetails {
    pub fn new(id: impl Into<String>, tty: bool) -> Self {
        Self {
            id: id.into(),
            tty,
            created: None,
        }
    }
}

/// Navigation direction across the container list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Next,
    Previous,
}

// ============================================================================
// Log Query Types
// ============================================================================

/// How much backlog to request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tail {
    /// Everything the runtime still has
    #[default]
    All,
    /// The last `n` lines
    Lines(u64),
}

impl Tail {
    /// Map a configured tail count; non-positive means "no backlog limit"
    pub fn from_count(count: i64) -> Self {
        if count > 0 {
            Self::Lines(count as u64)
        } else {
            Self::All
        }
    }

    /// Query value understood by the runtime
    pub fn as_query(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::Lines(n) => n.to_string(),
        }
    }
}

/// Options for a single container log query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogsOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    pub tail: Tail,
    pub follow: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
            timestamps: false,
            tail: Tail::All,
            follow: false,
            since: None,
            until: None,
        }
    }
}

impl LogsOptions {
    /// Options for a bounded historical window
    pub fn window(window: TimeWindow, timestamps: bool) -> Self {
        Self {
            timestamps,
            since: Some(window.since),
            until: Some(window.until),
            ..Default::default()
        }
    }
}

// ============================================================================
// Time Windows
// ============================================================================

/// Smallest step between two adjacent windows
pub const WINDOW_GAP: TimeDelta = TimeDelta::nanoseconds(1);

/// Default backfill window size
pub const DEFAULT_WINDOW: TimeDelta = TimeDelta::hours(24);

/// Inclusive time range `[since, until]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeWindow {
    /// The window of length `size` that ends at `end`
    ///
    /// `None` when the start falls outside the representable time range.
    pub fn ending_at(end: DateTime<Utc>, size: TimeDelta) -> Option<Self> {
        Some(Self {
            since: end.checked_sub_signed(size)?,
            until: end,
        })
    }

    /// End of the window immediately before this one
    pub fn previous_end(&self) -> Option<DateTime<Utc>> {
        self.since.checked_sub_signed(WINDOW_GAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_label_parts() {
        let c = Container::new("abc123456789def", "/web");
        assert_eq!(c.display_name(), "web");
        assert_eq!(c.short_id(), "abc123456789");

        let short = Container::new("abc", "db");
        assert_eq!(short.display_name(), "db");
        assert_eq!(short.short_id(), "abc");
    }

    #[test]
    fn test_tail_from_count() {
        assert_eq!(Tail::from_count(100), Tail::Lines(100));
        assert_eq!(Tail::from_count(0), Tail::All);
        assert_eq!(Tail::from_count(-5), Tail::All);
        assert_eq!(Tail::Lines(7).as_query(), "7");
        assert_eq!(Tail::All.as_query(), "all");
    }

    #[test]
    fn test_windows_are_contiguous() {
        let end = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let first = TimeWindow::ending_at(end, DEFAULT_WINDOW).unwrap();
        let second = TimeWindow::ending_at(first.previous_end().unwrap(), DEFAULT_WINDOW).unwrap();

        assert_eq!(first.until - first.since, DEFAULT_WINDOW);
        assert_eq!(second.until + WINDOW_GAP, first.since);
    }

    #[test]
    fn test_window_before_time_range_is_none() {
        let end = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        assert!(TimeWindow::ending_at(end, TimeDelta::hours(3_000_000_000)).is_none());

        let earliest = TimeWindow {
            since: DateTime::<Utc>::MIN_UTC,
            until: end,
        };
        assert!(earliest.previous_end().is_none());
    }
}
