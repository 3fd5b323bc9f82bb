//! Container runtime access for dlog
//!
//! This crate provides the `Runtime` abstraction over the container engine,
//! a Docker Engine API client speaking HTTP over a unix socket or TCP, and
//! the registry of containers the viewer cycles through.

mod client;
mod error;
#[cfg(feature = "mock")]
pub mod mock;
mod registry;
mod runtime;

pub use client::{DockerEngine, Endpoint};
pub use error::RuntimeError;
pub use registry::Registry;
pub use runtime::{ByteStream, Runtime};

// Re-export types that are used in our public API
pub use dlog_types::{Container, ContainerDetails, Direction, LogsOptions, Tail, TimeWindow};
