use thiserror::Error;

use dlog_docker::RuntimeError;

/// Errors decoding the runtime's multiplexed log stream
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("truncated log frame: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("log frame declares {len} bytes, more than the {max} allowed")]
    FrameTooLarge { len: usize, max: usize },

    #[error("unknown stream selector {0} in frame header")]
    UnknownStream(u8),

    #[error("failed to read log stream: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reading the timestamp prefix of log lines
#[derive(Error, Debug)]
pub enum TimestampError {
    #[error("no log lines to read timestamps from")]
    Empty,

    #[error("invalid timestamp in line {line:?}: {source}")]
    Invalid {
        line: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Errors writing to a sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink is closed")]
    Closed,
}

/// Errors from a log source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Demux(#[from] DemuxError),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("log source is closed")]
    Closed,

    #[error("log reader exited before signalling readiness")]
    Aborted,
}
