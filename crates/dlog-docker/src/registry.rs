use dlog_types::{Container, Direction};

use crate::{Runtime, RuntimeError};

/// Ordered set of containers with a cyclic cursor
///
/// Populated once at startup. Only the cursor changes afterwards, and only
/// from the session that owns the registry.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    containers: Vec<Container>,
    current: usize,
}

impl Registry {
    pub fn new(containers: Vec<Container>) -> Self {
        Self {
            containers,
            current: 0,
        }
    }

    /// Query the runtime for live containers, keeping the runtime's order
    pub async fn discover(runtime: &dyn Runtime) -> Result<Self, RuntimeError> {
        let containers = runtime.list_containers().await?;
        tracing::info!(count = containers.len(), "discovered containers");
        Ok(Self::new(containers))
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Cursor position (0 when empty)
    pub fn index(&self) -> usize {
        self.current
    }

    /// Container under the cursor
    pub fn current(&self) -> Option<&Container> {
        self.containers.get(self.current)
    }

    /// Advance the cursor, wrapping to the first container
    pub fn next(&mut self) {
        if !self.is_empty() {
            self.current = (self.current + 1) % self.len();
        }
    }

    /// Retreat the cursor, wrapping to the last container
    pub fn previous(&mut self) {
        if !self.is_empty() {
            self.current = (self.current + self.len() - 1) % self.len();
        }
    }

    pub fn step(&mut self, direction: Direction) {
        match direction {
            Direction::Next => self.next(),
            Direction::Previous => self.previous(),
        }
    }

    /// Move the cursor to an explicit position; out-of-range is ignored
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.len() {
            self.current = index;
            true
        } else {
            false
        }
    }

    /// Human-readable label: `(pos/count) name (ID:first-12)`
    pub fn display_label(&self) -> Option<String> {
        let container = self.current()?;
        Some(format!(
            "({}/{}) {} (ID:{})",
            self.current + 1,
            self.len(),
            container.display_name(),
            container.short_id()
        ))
    }
}
