//! Log processing for dlog
//!
//! This crate provides the frame demultiplexer, the per-container log
//! source with its follow/backfill lifecycle, and the sinks logs land in.

mod backfill;
mod demux;
mod error;
mod sink;
mod source;
mod timestamp;

pub use backfill::{Backfill, BackfillReport, BackfillStop, windows};
pub use demux::{LogFrame, LogFrameCodec, MAX_FRAME_LEN, StreamKind, demux, demux_into, frames, read_all};
pub use error::{DemuxError, SinkError, SourceError, TimestampError};
pub use sink::{CacheFile, Document, Sink};
pub use source::{LogSource, SourceEvent, SourceOptions};
pub use timestamp::{TimestampStripper, chunk_bounds, line_timestamp};

// Re-export types used in our public API
pub use dlog_types::{Container, LogsOptions, Tail, TimeWindow};
