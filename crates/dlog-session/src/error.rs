use thiserror::Error;

use dlog_docker::RuntimeError;
use dlog_logs::{SinkError, SourceError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no containers found")]
    NoContainers,

    #[error("failed to switch to {container}: {source}")]
    Switch {
        container: String,
        #[source]
        source: Box<SessionError>,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("session is closed")]
    Closed,
}
