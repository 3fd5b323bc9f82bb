use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use dlog_docker::{Registry, Runtime};
use dlog_logs::{LogSource, Sink, SourceEvent, SourceOptions};
use dlog_types::{Container, Direction};

use crate::{SessionError, SinkFactory};

/// Lifecycle of a viewing session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing loaded yet, or the last load failed
    Idle,
    Loading,
    Streaming,
    /// Tearing down the previous container's source
    Stopping,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub source: SourceOptions,
}

/// Ties the registry cursor to a single log source and its sink
///
/// At most one source is active at any time: switching stops (and joins)
/// the current source before the next container is loaded.
pub struct Session<F: SinkFactory> {
    runtime: Arc<dyn Runtime>,
    registry: Registry,
    factory: F,
    source: LogSource,
    sink: Option<Arc<F::Sink>>,
    state: SessionState,
    events: Option<mpsc::UnboundedReceiver<SourceEvent>>,
}

impl<F: SinkFactory> Session<F> {
    pub fn new(runtime: Arc<dyn Runtime>, registry: Registry, factory: F, config: SessionConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = LogSource::new(Arc::clone(&runtime), config.source, tx);

        Self {
            runtime,
            registry,
            factory,
            source,
            sink: None,
            state: SessionState::Idle,
            events: Some(rx),
        }
    }

    /// Discover containers and build a session over them
    pub async fn discover(
        runtime: Arc<dyn Runtime>,
        factory: F,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let registry = Registry::discover(runtime.as_ref()).await?;
        if registry.is_empty() {
            return Err(SessionError::NoContainers);
        }
        tracing::info!(containers = registry.len(), "discovered containers");

        Ok(Self::new(runtime, registry, factory, config))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn current(&self) -> Option<&Container> {
        self.registry.current()
    }

    /// Label of the current container, e.g. `(1/2) web (ID:abc123456789)`
    pub fn label(&self) -> Option<String> {
        self.registry.display_label()
    }

    /// Id of the latest load; events from any other load are stale
    pub fn load_id(&self) -> u64 {
        self.source.load_id()
    }

    /// Sink the current container's logs are written to
    pub fn current_sink(&self) -> Option<Arc<F::Sink>> {
        self.sink.clone()
    }

    /// Take the receiver for source events; `None` once taken
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<SourceEvent>> {
        self.events.take()
    }

    /// Load the current container
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }

        self.unload().await;
        self.open().await
    }

    /// Move to the next or previous container and load it
    ///
    /// If the new container fails to load, the cursor moves back, the
    /// previous container is reloaded into a fresh sink and the error is
    /// returned as `SessionError::Switch`.
    pub async fn switch_to(&mut self, direction: Direction) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        if self.registry.is_empty() {
            return Err(SessionError::NoContainers);
        }

        self.unload().await;

        let previous = self.registry.index();
        self.registry.step(direction);
        tracing::info!(?direction, label = ?self.registry.display_label(), "switching container");

        let Err(error) = self.open().await else {
            return Ok(());
        };

        let container = self
            .registry
            .current()
            .map(|c| c.display_name().to_string())
            .unwrap_or_default();
        tracing::warn!(%container, "switch failed, restoring previous container: {}", error);

        self.registry.select(previous);
        if let Err(e) = self.open().await {
            tracing::error!("failed to restore previous container: {}", e);
        }

        Err(SessionError::Switch {
            container,
            source: Box::new(error),
        })
    }

    /// Stop streaming, release the sink and close the runtime
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        self.unload().await;
        self.state = SessionState::Closed;
        self.source.close().await?;
        tracing::info!("session closed");
        Ok(())
    }

    /// Stop the active source (joining its tasks) and release its sink
    async fn unload(&mut self) {
        if self.source.is_active() || self.sink.is_some() {
            self.state = SessionState::Stopping;
        }

        self.source.stop().await;

        if let Some(sink) = self.sink.take() {
            self.factory.release(sink);
        }
        self.state = SessionState::Idle;
    }

    /// Acquire a sink for the current container and start its source
    async fn open(&mut self) -> Result<(), SessionError> {
        let container = self
            .registry
            .current()
            .cloned()
            .ok_or(SessionError::NoContainers)?;
        let label = self
            .registry
            .display_label()
            .unwrap_or_else(|| container.display_name().to_string());

        self.state = SessionState::Loading;
        let sink = match self.factory.acquire(&container, &label) {
            Ok(sink) => sink,
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e.into());
            }
        };

        let target: Arc<dyn Sink> = sink.clone();
        if let Err(e) = self.source.load(&container, target).await {
            self.factory.release(sink);
            self.state = SessionState::Idle;
            return Err(e.into());
        }

        self.sink = Some(sink);
        self.state = SessionState::Streaming;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlog_docker::mock::MockRuntime;

    use crate::DocumentFactory;

    fn containers() -> Vec<Container> {
        vec![
            Container::new("aaa111111111", "/web"),
            Container::new("bbb222222222", "/db"),
        ]
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let mock = Arc::new(MockRuntime::new(containers()));
        let mut session = Session::discover(mock.clone(), DocumentFactory::new(), SessionConfig::default())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Idle);

        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(
            session.current_sink().unwrap().caption(),
            "(1/2) web (ID:aaa111111111)"
        );

        session.switch_to(Direction::Next).await.unwrap();
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(session.label().unwrap(), "(2/2) db (ID:bbb222222222)");

        session.shutdown().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.current_sink().is_none());
        assert!(matches!(session.start().await, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_discover_without_containers() {
        let mock = Arc::new(MockRuntime::new(vec![]));
        let result = Session::discover(mock, DocumentFactory::new(), SessionConfig::default()).await;
        assert!(matches!(result, Err(SessionError::NoContainers)));
    }

    #[tokio::test]
    async fn test_discover_failure_is_fatal() {
        let mock = Arc::new(MockRuntime::new(containers()));
        mock.fail_list("Cannot connect to the Docker daemon");
        let result = Session::discover(mock, DocumentFactory::new(), SessionConfig::default()).await;
        assert!(matches!(result, Err(SessionError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_events_taken_once() {
        let mock = Arc::new(MockRuntime::new(containers()));
        let mut session = Session::discover(mock, DocumentFactory::new(), SessionConfig::default())
            .await
            .unwrap();
        assert!(session.events().is_some());
        assert!(session.events().is_none());
    }
}
