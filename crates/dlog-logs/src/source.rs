use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use dlog_docker::Runtime;
use dlog_types::{Container, DEFAULT_WINDOW, LogsOptions, Tail, TimeWindow, WINDOW_GAP};

use crate::{
    Backfill, BackfillStop, Sink, SinkError, SourceError, StreamKind, TimestampError,
    TimestampStripper, chunk_bounds, frames,
};

/// How a source retrieves logs
#[derive(Clone, Debug)]
pub struct SourceOptions {
    /// Backlog lines to request first; non-positive means start from now
    pub tail: i64,

    /// Keep streaming new output after the backlog
    pub follow: bool,

    /// Keep the runtime's timestamp prefix in the sink
    pub timestamps: bool,

    /// Backfill history older than the tailed backlog
    pub download: bool,

    /// Backfill window size
    pub window: TimeDelta,

    /// Upper bound on how long `load` waits, counted from the call
    pub warmup: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            tail: 1000,
            follow: true,
            timestamps: false,
            download: false,
            window: DEFAULT_WINDOW,
            warmup: Duration::from_millis(100),
        }
    }
}

/// Progress reported by a source's background tasks
///
/// `load` is the id of the `LogSource::load` call that produced the event,
/// so events queued by a replaced load can be told apart even when the
/// same container was loaded again.
#[derive(Debug)]
pub enum SourceEvent {
    /// The runtime accepted the log request
    Started { load: u64, container: Container },
    /// The runtime closed the log stream
    Ended { load: u64, container: Container },
    /// Streaming stopped because of an error
    Failed {
        load: u64,
        container: Container,
        error: SourceError,
    },
    /// A history window was prepended to the sink
    BackfillWindow {
        load: u64,
        container: Container,
        window: TimeWindow,
        bytes: usize,
    },
    BackfillFinished {
        load: u64,
        container: Container,
        windows: usize,
        stop: BackfillStop,
    },
}

impl SourceEvent {
    /// Id of the load that produced this event
    pub fn load(&self) -> u64 {
        match self {
            Self::Started { load, .. }
            | Self::Ended { load, .. }
            | Self::Failed { load, .. }
            | Self::BackfillWindow { load, .. }
            | Self::BackfillFinished { load, .. } => *load,
        }
    }
}

/// Everything a background task needs to move bytes into a sink
#[derive(Clone)]
struct Pipe {
    runtime: Arc<dyn Runtime>,
    load: u64,
    container: Container,
    /// Learned from inspect before any log request is made
    tty: bool,
    sink: Arc<dyn Sink>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<SourceEvent>,
    /// Timestamps were requested for bookkeeping only and must not reach the sink
    strip: bool,
}

impl Pipe {
    fn emit(&self, event: SourceEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn started(&self) {
        self.emit(SourceEvent::Started {
            load: self.load,
            container: self.container.clone(),
        });
    }

    fn fail(&self, error: SourceError) {
        tracing::error!(container = %self.container.name, "log source failed: {}", error);
        self.emit(SourceEvent::Failed {
            load: self.load,
            container: self.container.clone(),
            error,
        });
    }

    fn writer(&self) -> SinkWriter {
        SinkWriter {
            sink: Arc::clone(&self.sink),
            stripper: self.strip.then(TimestampStripper::new),
        }
    }
}

struct SinkWriter {
    sink: Arc<dyn Sink>,
    stripper: Option<TimestampStripper>,
}

impl SinkWriter {
    fn append(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        match &mut self.stripper {
            Some(stripper) => self.sink.append(&stripper.strip(bytes)),
            None => self.sink.append(bytes),
        }
    }
}

/// One-shot signal from a reader task that releases `load`
///
/// The deadline starts when `load` is called, so a runtime that never
/// answers cannot hold the caller past the warm-up bound.
struct Readiness {
    tx: Option<oneshot::Sender<Result<(), SourceError>>>,
    deadline: Pin<Box<Sleep>>,
}

impl Readiness {
    fn new(tx: oneshot::Sender<Result<(), SourceError>>, warmup: Duration) -> Self {
        Self {
            tx: Some(tx),
            deadline: Box::pin(tokio::time::sleep(warmup)),
        }
    }

    fn ready(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Ok(()));
        }
    }

    /// Hand the error to `load` if it is still waiting, otherwise report it
    fn reject(&mut self, pipe: &Pipe, error: SourceError) {
        match self.tx.take() {
            Some(tx) => {
                tracing::error!(container = %pipe.container.name, "log request failed: {}", error);
                let _ = tx.send(Err(error));
            }
            None => pipe.fail(error),
        }
    }

    /// Await `fut`, releasing `load` if the deadline passes first
    ///
    /// Returns `None` once `cancel` fires.
    async fn wait<F: Future>(&mut self, cancel: &CancellationToken, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.ready();
                    return None;
                }

                output = &mut fut => return Some(output),

                _ = &mut self.deadline, if self.tx.is_some() => self.ready(),
            }
        }
    }
}

/// Log retrieval for one container at a time
///
/// `load` starts background tasks writing into a sink; `stop` cancels them
/// and waits until every one has exited, so no write happens after it
/// returns.
pub struct LogSource {
    runtime: Arc<dyn Runtime>,
    options: SourceOptions,
    events: mpsc::UnboundedSender<SourceEvent>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    loads: u64,
    target: Option<Container>,
    closed: bool,
}

impl LogSource {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        options: SourceOptions,
        events: mpsc::UnboundedSender<SourceEvent>,
    ) -> Self {
        Self {
            runtime,
            options,
            events,
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            loads: 0,
            target: None,
            closed: false,
        }
    }

    /// Whether a load is in effect (until `stop`)
    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Id of the most recent load; events carry the id of the load they belong to
    pub fn load_id(&self) -> u64 {
        self.loads
    }

    /// Start retrieving logs for `container` into `sink`
    ///
    /// Returns once the reader has written its first bytes, the stream has
    /// ended, or the warm-up bound elapsed, whichever comes first. A request
    /// rejected before then is returned as an error; later failures arrive
    /// as `SourceEvent`s.
    pub async fn load(&mut self, container: &Container, sink: Arc<dyn Sink>) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        self.stop().await;

        self.loads += 1;
        self.cancel = CancellationToken::new();
        self.target = Some(container.clone());

        let pipe = Pipe {
            runtime: Arc::clone(&self.runtime),
            load: self.loads,
            container: container.clone(),
            tty: false,
            sink,
            cancel: self.cancel.clone(),
            events: self.events.clone(),
            strip: self.options.download && !self.options.timestamps,
        };

        let (tx, rx) = oneshot::channel();
        let ready = Readiness::new(tx, self.options.warmup);
        self.tasks.spawn(run(pipe, self.options.clone(), ready));

        let result = rx.await.unwrap_or(Err(SourceError::Aborted));
        if result.is_err() {
            self.stop().await;
        }
        result
    }

    /// Cancel background tasks and wait for all of them to exit
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!("log task panicked: {}", e);
                }
            }
        }

        if let Some(container) = self.target.take() {
            tracing::debug!(container = %container.name, load = self.loads, "log source stopped");
        }
    }

    /// Stop and release the runtime handle; the source cannot be reused
    pub async fn close(&mut self) -> Result<(), SourceError> {
        self.stop().await;
        if !self.closed {
            self.closed = true;
            self.runtime.close().await?;
        }
        Ok(())
    }
}

impl Drop for LogSource {
    fn drop(&mut self) {
        // Remaining tasks are aborted when the JoinSet drops
        self.cancel.cancel();
    }
}

/// Inspect the container, then stream its logs in the configured mode
async fn run(mut pipe: Pipe, options: SourceOptions, mut ready: Readiness) {
    let inspect = pipe.runtime.inspect(&pipe.container.id);
    let details = match ready.wait(&pipe.cancel, inspect).await {
        None => return,
        Some(Ok(details)) => details,
        Some(Err(e)) => {
            ready.reject(&pipe, e.into());
            return;
        }
    };
    pipe.tty = details.tty;

    tracing::info!(
        container = %pipe.container.name,
        load = pipe.load,
        tty = details.tty,
        tail = options.tail,
        follow = options.follow,
        download = options.download,
        "loading logs"
    );

    if options.download {
        with_history(pipe, options, details.created, ready).await;
    } else {
        plain(pipe, &options, ready).await;
    }
}

/// One tail+follow request streamed straight into the sink
async fn plain(pipe: Pipe, options: &SourceOptions, ready: Readiness) {
    let mut request = LogsOptions {
        timestamps: options.timestamps,
        tail: Tail::from_count(options.tail),
        follow: options.follow,
        ..Default::default()
    };
    if options.tail <= 0 {
        request.since = Some(Utc::now());
    }

    stream(pipe, request, ready, true).await;
}

/// Tail, then follow from the last tailed line while history is backfilled
async fn with_history(
    pipe: Pipe,
    options: SourceOptions,
    floor: Option<DateTime<Utc>>,
    mut ready: Readiness,
) {
    let now = Utc::now();

    let (history_from, resume_from) = if options.tail > 0 {
        match ready.wait(&pipe.cancel, bootstrap(&pipe, options.tail)).await {
            None => return,
            Some(Ok(Some((first, last)))) => (Some(first), last + WINDOW_GAP),
            Some(Ok(None)) => (None, now),
            Some(Err(e)) => {
                ready.reject(&pipe, e);
                return;
            }
        }
    } else {
        pipe.started();
        (Some(now), now)
    };

    // The tail is in the sink; later failures are events
    if options.tail > 0 {
        ready.ready();
    }

    let follow = {
        let pipe = pipe.clone();
        let enabled = options.follow;
        async move {
            if enabled {
                let request = LogsOptions {
                    timestamps: true,
                    follow: true,
                    since: Some(resume_from),
                    ..Default::default()
                };
                stream(pipe, request, ready, false).await;
            } else {
                ready.ready();
            }
        }
    };

    let history = async move {
        if let Some(start) = history_from {
            let backfill = Backfill::new(
                Arc::clone(&pipe.runtime),
                pipe.container.id.clone(),
                pipe.tty,
                options.window,
                pipe.cancel.clone(),
            )
            .with_floor(floor);

            backfill_into(pipe, backfill, start).await;
        }
    };

    tokio::join!(follow, history);
}

/// Fetch the initial tail and read its time bounds
///
/// Only a rejected request or a sink failure is an error. Unreadable
/// timestamps disable backfill and are reported as an event.
async fn bootstrap(
    pipe: &Pipe,
    tail: i64,
) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, SourceError> {
    let options = LogsOptions {
        timestamps: true,
        tail: Tail::from_count(tail),
        ..Default::default()
    };

    tracing::debug!(container = %pipe.container.name, tail, "requesting first records");
    let stream = pipe.runtime.logs(&pipe.container.id, &options).await?;
    pipe.started();

    let mut frames = frames(stream, pipe.tty);
    let mut writer = pipe.writer();
    let mut raw = Vec::new();

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(frame) => {
                writer.append(&frame.payload)?;
                raw.extend_from_slice(&frame.payload);
            }
            Err(e) => {
                pipe.fail(e.into());
                return Ok(None);
            }
        }
    }

    match chunk_bounds(&raw) {
        Ok(bounds) => Ok(Some(bounds)),
        Err(TimestampError::Empty) => {
            tracing::debug!(container = %pipe.container.name, "no backlog, nothing to backfill");
            Ok(None)
        }
        Err(e) => {
            pipe.fail(e.into());
            Ok(None)
        }
    }
}

/// Stream one log request into the sink until cancelled or closed
async fn stream(pipe: Pipe, options: LogsOptions, mut ready: Readiness, announce: bool) {
    let request = pipe.runtime.logs(&pipe.container.id, &options);
    let stream = match ready.wait(&pipe.cancel, request).await {
        None => return,
        Some(Ok(stream)) => stream,
        Some(Err(e)) => {
            ready.reject(&pipe, e.into());
            return;
        }
    };

    if announce {
        pipe.started();
    }

    let mut frames = frames(stream, pipe.tty);
    let mut writer = pipe.writer();

    while let Some(frame) = ready.wait(&pipe.cancel, frames.next()).await {
        match frame {
            Some(Ok(frame)) => {
                if frame.stream == StreamKind::System {
                    tracing::warn!(
                        container = %pipe.container.name,
                        "runtime error in log stream: {}",
                        String::from_utf8_lossy(&frame.payload)
                    );
                }
                if let Err(e) = writer.append(&frame.payload) {
                    pipe.fail(e.into());
                    break;
                }
                ready.ready();
            }
            Some(Err(e)) => {
                pipe.fail(e.into());
                break;
            }
            None => {
                tracing::debug!(container = %pipe.container.name, "runtime closed log stream");
                pipe.emit(SourceEvent::Ended {
                    load: pipe.load,
                    container: pipe.container.clone(),
                });
                break;
            }
        }
    }

    ready.ready();
}

/// Run a backfill, prepending each window to the sink
async fn backfill_into(pipe: Pipe, backfill: Backfill, start: DateTime<Utc>) {
    let report = backfill
        .run(start, |window, chunk| {
            if chunk.is_empty() {
                return;
            }

            let bytes = if pipe.strip {
                TimestampStripper::new().strip(&chunk)
            } else {
                chunk.to_vec()
            };

            if let Err(e) = pipe.sink.prepend(&bytes) {
                tracing::error!(container = %pipe.container.name, "failed to prepend history: {}", e);
                return;
            }

            pipe.emit(SourceEvent::BackfillWindow {
                load: pipe.load,
                container: pipe.container.clone(),
                window,
                bytes: bytes.len(),
            });
        })
        .await;

    pipe.emit(SourceEvent::BackfillFinished {
        load: pipe.load,
        container: pipe.container.clone(),
        windows: report.windows,
        stop: report.stop,
    });
}
