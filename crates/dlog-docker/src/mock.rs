//! In-memory runtime for tests
//!
//! Log responses are scripted per container and consumed one per `logs`
//! call, with separate queues for follow and one-shot queries since a
//! source issues both concurrently. Every call is recorded so tests can
//! assert on the queries issued.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use futures::{StreamExt, future, stream};
use parking_lot::Mutex;

use dlog_types::{Container, ContainerDetails, LogsOptions};

use crate::runtime::{ByteStream, Runtime};
use crate::RuntimeError;

/// Stream selector bytes used in framed output
pub const STDOUT: u8 = 1;
pub const STDERR: u8 = 2;

/// Encode one multiplexed frame the way the daemon does
pub fn frame(stream: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + payload.len());
    buf.put_u8(stream);
    buf.put_bytes(0, 3);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Scripted answer to one `logs` call
pub enum MockLogs {
    /// Emit the chunks, then close the stream
    Chunks(Vec<Bytes>),
    /// Emit the chunks, then stay open until the caller drops the stream
    Follow(Vec<Bytes>),
    /// Forward whatever the test sends; closes when the sender is dropped
    Live(mpsc::UnboundedReceiver<Result<Bytes, RuntimeError>>),
    /// Reject the request
    Fail(String),
    /// Never answer, like a daemon that accepted the connection and went quiet
    Hang,
}

/// A recorded `logs` call
#[derive(Clone, Debug)]
pub struct LogCall {
    pub id: String,
    pub options: LogsOptions,
}

#[derive(Default)]
pub struct MockRuntime {
    containers: Vec<Container>,
    details: HashMap<String, ContainerDetails>,
    responses: Mutex<HashMap<(String, bool), VecDeque<MockLogs>>>,
    calls: Mutex<Vec<LogCall>>,
    list_error: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl MockRuntime {
    pub fn new(containers: Vec<Container>) -> Self {
        let details = containers
            .iter()
            .map(|c| (c.id.clone(), ContainerDetails::new(c.id.clone(), false)))
            .collect();

        Self {
            containers,
            details,
            ..Default::default()
        }
    }

    pub fn with_tty(mut self, id: &str, tty: bool) -> Self {
        if let Some(details) = self.details.get_mut(id) {
            details.tty = tty;
        }
        self
    }

    pub fn with_created(mut self, id: &str, created: DateTime<Utc>) -> Self {
        if let Some(details) = self.details.get_mut(id) {
            details.created = Some(created);
        }
        self
    }

    /// Make the next `list_containers` call fail
    pub fn fail_list(&self, message: &str) {
        *self.list_error.lock() = Some(message.to_string());
    }

    /// Queue a response for the next one-shot (`follow = false`) query on `id`
    pub fn push_logs(&self, id: &str, logs: MockLogs) {
        self.push(id, false, logs);
    }

    /// Queue a response for the next follow query on `id`
    pub fn push_follow(&self, id: &str, logs: MockLogs) {
        self.push(id, true, logs);
    }

    /// Queue a live follow stream and return its sending half
    pub fn live(&self, id: &str) -> mpsc::UnboundedSender<Result<Bytes, RuntimeError>> {
        let (tx, rx) = mpsc::unbounded();
        self.push_follow(id, MockLogs::Live(rx));
        tx
    }

    fn push(&self, id: &str, follow: bool, logs: MockLogs) {
        self.responses
            .lock()
            .entry((id.to_string(), follow))
            .or_default()
            .push_back(logs);
    }

    pub fn calls(&self) -> Vec<LogCall> {
        self.calls.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), RuntimeError> {
        if self.is_closed() {
            Err(RuntimeError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn list_containers(&self) -> Result<Vec<Container>, RuntimeError> {
        self.check_open()?;
        if let Some(message) = self.list_error.lock().take() {
            return Err(RuntimeError::Stream(message));
        }
        Ok(self.containers.clone())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        self.check_open()?;
        self.details
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(format!("No such container: {}", id)))
    }

    async fn logs(&self, id: &str, options: &LogsOptions) -> Result<ByteStream, RuntimeError> {
        self.check_open()?;
        if !self.details.contains_key(id) {
            return Err(RuntimeError::NotFound(format!("No such container: {}", id)));
        }

        self.calls.lock().push(LogCall {
            id: id.to_string(),
            options: options.clone(),
        });

        let next = self
            .responses
            .lock()
            .get_mut(&(id.to_string(), options.follow))
            .and_then(|queue| queue.pop_front());

        match next {
            // Unscripted follow queries stay open like a quiet container
            None if options.follow => Ok(stream::pending().boxed()),
            None => Ok(stream::empty().boxed()),
            Some(MockLogs::Chunks(chunks)) => Ok(stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Some(MockLogs::Follow(chunks)) => Ok(stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Some(MockLogs::Live(rx)) => Ok(rx.boxed()),
            Some(MockLogs::Fail(message)) => Err(RuntimeError::Api {
                status: 500,
                message,
            }),
            Some(MockLogs::Hang) => future::pending().await,
        }
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
