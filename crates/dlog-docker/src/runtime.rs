use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use dlog_types::{Container, ContainerDetails, LogsOptions};

use crate::RuntimeError;

/// Raw log bytes as delivered by the runtime (still framed for non-TTY containers)
pub type ByteStream = BoxStream<'static, Result<Bytes, RuntimeError>>;

/// A container engine that can list containers and stream their logs
///
/// One handle is shared for the whole session; dropping a returned
/// `ByteStream` aborts the underlying request.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// List running containers in the order the runtime reports them
    async fn list_containers(&self) -> Result<Vec<Container>, RuntimeError>;

    /// Inspect a container (TTY allocation, creation time)
    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError>;

    /// Open a log query; resolves once the runtime has accepted the request
    async fn logs(&self, id: &str, options: &LogsOptions) -> Result<ByteStream, RuntimeError>;

    /// Release the client handle; later calls fail with `RuntimeError::Closed`
    async fn close(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}
