//! Session coordination for dlog
//!
//! A session owns the runtime handle, the container registry and the single
//! active log source, and hands each container its own sink.

mod error;
mod factory;
mod session;

pub use error::SessionError;
pub use factory::{CacheFileFactory, CachedDocument, DocumentFactory, SinkFactory};
pub use session::{Session, SessionConfig, SessionState};

// Re-export types used in our public API
pub use dlog_logs::{Document, SourceEvent, SourceOptions};
pub use dlog_types::{Container, Direction};
