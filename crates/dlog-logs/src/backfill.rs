//! Historical log windowing
//!
//! Asking the runtime for an unbounded range can return gigabytes, so older
//! history is pulled in fixed-size windows walking backward from the first
//! tailed line. Window `n` (1-based) for start `T` and size `W` is
//!
//! ```text
//! until = T - 1 - (n - 1) * (W + 1)
//! since = until - W
//! ```
//!
//! with `1` being one nanosecond, so adjacent windows neither overlap nor
//! leave a gap.

use std::iter;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use dlog_docker::Runtime;
use dlog_types::{LogsOptions, TimeWindow, WINDOW_GAP};

use crate::{SourceError, read_all};

/// The sequence of windows preceding `start`
///
/// Ends only where a window would start before the earliest representable time.
pub fn windows(start: DateTime<Utc>, size: TimeDelta) -> impl Iterator<Item = TimeWindow> {
    let first = start
        .checked_sub_signed(WINDOW_GAP)
        .and_then(|end| TimeWindow::ending_at(end, size));
    iter::successors(first, move |w| {
        w.previous_end().and_then(|end| TimeWindow::ending_at(end, size))
    })
}

/// Why a backfill run ended
#[derive(Debug)]
pub enum BackfillStop {
    Cancelled,
    /// The next window would lie entirely before the floor
    ReachedFloor,
    Failed(SourceError),
}

/// Summary of a backfill run
#[derive(Debug)]
pub struct BackfillReport {
    /// Windows fetched and handed to the callback
    pub windows: usize,
    pub stop: BackfillStop,
}

/// Cancellable backward walk through a container's history
pub struct Backfill {
    runtime: Arc<dyn Runtime>,
    container_id: String,
    tty: bool,
    window: TimeDelta,
    floor: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

impl Backfill {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        container_id: impl Into<String>,
        tty: bool,
        window: TimeDelta,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            container_id: container_id.into(),
            tty,
            window,
            floor: None,
            cancel,
        }
    }

    /// Stop once windows end before this instant (e.g. container creation)
    pub fn with_floor(mut self, floor: Option<DateTime<Utc>>) -> Self {
        self.floor = floor;
        self
    }

    /// Walk backward from `start`, calling `on_window` after each fetch
    ///
    /// The callback runs on the backfill task; blocking in it stalls the walk.
    pub async fn run<F>(self, start: DateTime<Utc>, mut on_window: F) -> BackfillReport
    where
        F: FnMut(TimeWindow, Bytes),
    {
        let floor = self.floor.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let mut fetched = 0;

        for window in windows(start, self.window) {
            if self.cancel.is_cancelled() {
                return self.report(fetched, BackfillStop::Cancelled);
            }
            if window.until < floor {
                return self.report(fetched, BackfillStop::ReachedFloor);
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return self.report(fetched, BackfillStop::Cancelled);
                }
                result = self.fetch(window) => result,
            };

            match result {
                Ok(chunk) => {
                    fetched += 1;
                    tracing::debug!(
                        container = %self.container_id,
                        since = %window.since,
                        until = %window.until,
                        bytes = chunk.len(),
                        "fetched backfill window"
                    );
                    on_window(window, chunk);
                }
                Err(e) => return self.report(fetched, BackfillStop::Failed(e)),
            }
        }

        // Ran out of representable time before reaching the floor
        self.report(fetched, BackfillStop::ReachedFloor)
    }

    async fn fetch(&self, window: TimeWindow) -> Result<Bytes, SourceError> {
        let options = LogsOptions::window(window, true);
        let stream = self.runtime.logs(&self.container_id, &options).await?;
        Ok(Bytes::from(read_all(stream, self.tty).await?))
    }

    fn report(&self, windows: usize, stop: BackfillStop) -> BackfillReport {
        match &stop {
            BackfillStop::Failed(e) => {
                tracing::error!(container = %self.container_id, windows, "backfill failed: {}", e)
            }
            _ => tracing::debug!(container = %self.container_id, windows, ?stop, "backfill finished"),
        }
        BackfillReport { windows, stop }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dlog_docker::mock::{MockLogs, MockRuntime, STDOUT, frame};
    use dlog_types::{Container, DEFAULT_WINDOW};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_window_formula() {
        let t = start();
        let w = TimeDelta::hours(24);

        for (i, window) in windows(t, w).take(5).enumerate() {
            let n = i as i32 + 1;
            let until = t - WINDOW_GAP - (w + WINDOW_GAP) * (n - 1);
            assert_eq!(window.until, until);
            assert_eq!(window.since, until - w);
        }
    }

    #[test]
    fn test_windows_strictly_decreasing_and_contiguous() {
        let all: Vec<TimeWindow> = windows(start(), TimeDelta::minutes(10)).take(10).collect();
        for pair in all.windows(2) {
            assert!(pair[1].until < pair[0].since);
            assert_eq!(pair[1].until + WINDOW_GAP, pair[0].since);
        }
    }

    fn runtime() -> Arc<MockRuntime> {
        Arc::new(MockRuntime::new(vec![Container::new("abc", "/web")]))
    }

    #[tokio::test]
    async fn test_cancel_after_k_windows_bounds_calls() {
        let mock = runtime();
        let cancel = CancellationToken::new();
        let backfill = Backfill::new(mock.clone(), "abc", false, DEFAULT_WINDOW, cancel.clone());

        let k = 3;
        let mut seen = Vec::new();
        let report = backfill
            .run(start(), |window, _| {
                seen.push(window);
                if seen.len() == k {
                    cancel.cancel();
                }
            })
            .await;

        assert!(matches!(report.stop, BackfillStop::Cancelled));
        assert_eq!(report.windows, k);
        assert!(mock.calls().len() <= k + 1);

        // Each call asked for exactly the window handed to the callback
        for (call, window) in mock.calls().iter().zip(&seen) {
            assert_eq!(call.options.since, Some(window.since));
            assert_eq!(call.options.until, Some(window.until));
            assert!(!call.options.follow);
        }
    }

    #[tokio::test]
    async fn test_stops_at_floor() {
        let mock = Arc::new(
            MockRuntime::new(vec![Container::new("abc", "/web")])
                .with_created("abc", start() - TimeDelta::hours(60)),
        );
        mock.push_logs("abc", MockLogs::Chunks(vec![frame(STDOUT, b"day -1\n")]));
        mock.push_logs("abc", MockLogs::Chunks(vec![frame(STDOUT, b"day -2\n")]));

        let backfill = Backfill::new(mock.clone(), "abc", false, DEFAULT_WINDOW, CancellationToken::new())
            .with_floor(Some(start() - TimeDelta::hours(60)));

        let mut chunks = Vec::new();
        let report = backfill.run(start(), |_, chunk| chunks.push(chunk)).await;

        // Windows ending at -0h, -24h and -48h reach past the floor at -60h
        assert!(matches!(report.stop, BackfillStop::ReachedFloor));
        assert_eq!(report.windows, 3);
        assert_eq!(chunks[0], Bytes::from_static(b"day -1\n"));
        assert_eq!(chunks[1], Bytes::from_static(b"day -2\n"));
        assert!(chunks[2].is_empty());
    }

    #[tokio::test]
    async fn test_oversized_window_reaches_floor_without_fetching() {
        let mock = runtime();
        let backfill = Backfill::new(
            mock.clone(),
            "abc",
            false,
            TimeDelta::hours(3_000_000_000),
            CancellationToken::new(),
        );

        assert!(windows(start(), TimeDelta::hours(3_000_000_000)).next().is_none());

        let report = backfill.run(start(), |_, _| {}).await;
        assert!(matches!(report.stop, BackfillStop::ReachedFloor));
        assert_eq!(report.windows, 0);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_failure_ends_loop() {
        let mock = runtime();
        mock.push_logs("abc", MockLogs::Chunks(vec![frame(STDOUT, b"one\n")]));
        mock.push_logs("abc", MockLogs::Fail("daemon went away".into()));

        let backfill = Backfill::new(mock.clone(), "abc", false, DEFAULT_WINDOW, CancellationToken::new());
        let report = backfill.run(start(), |_, _| {}).await;

        assert_eq!(report.windows, 1);
        assert!(matches!(
            report.stop,
            BackfillStop::Failed(SourceError::Runtime(_))
        ));
        assert_eq!(mock.calls().len(), 2);
    }
}
