use thiserror::Error;

/// Errors returned by a container runtime
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("invalid DOCKER_HOST value: {0}")]
    InvalidHost(String),

    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP transport error: {0}")]
    Http(#[from] hyper::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("runtime returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode runtime response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("log stream interrupted: {0}")]
    Stream(String),

    #[error("runtime client is closed")]
    Closed,
}

impl RuntimeError {
    /// Map an HTTP status and daemon message to an error
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            404 => Self::NotFound(message),
            401 | 403 => Self::PermissionDenied(message),
            _ => Self::Api { status, message },
        }
    }
}
