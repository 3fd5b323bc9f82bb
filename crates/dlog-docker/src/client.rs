//! Docker Engine API client
//!
//! Speaks plain HTTP/1.1 to the daemon over its unix socket (or TCP when
//! `DOCKER_HOST` says so). Every request opens its own connection, so a log
//! stream can be torn down by dropping it without disturbing other calls.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::{Request, Response, header};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use dlog_types::{Container, ContainerDetails, LogsOptions};

use crate::runtime::{ByteStream, Runtime};
use crate::RuntimeError;

/// Socket used when `DOCKER_HOST` is not set
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Where the daemon listens
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    /// Resolve the endpoint from `DOCKER_HOST`, falling back to the default socket
    pub fn from_env() -> Result<Self, RuntimeError> {
        match std::env::var("DOCKER_HOST") {
            Ok(host) if !host.trim().is_empty() => Self::parse(host.trim()),
            _ => Ok(Self::Unix(PathBuf::from(DEFAULT_SOCKET))),
        }
    }

    /// Parse a `unix://` or `tcp://` host string
    pub fn parse(host: &str) -> Result<Self, RuntimeError> {
        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(RuntimeError::InvalidHost(host.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        let addr = host
            .strip_prefix("tcp://")
            .or_else(|| host.strip_prefix("http://"))
            .map(|a| a.trim_end_matches('/'))
            .filter(|a| !a.is_empty())
            .ok_or_else(|| RuntimeError::InvalidHost(host.to_string()))?;

        Ok(Self::Tcp(addr.to_string()))
    }

    fn host_header(&self) -> &str {
        match self {
            Self::Unix(_) => "docker",
            Self::Tcp(addr) => addr,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// Docker Engine client
pub struct DockerEngine {
    endpoint: Endpoint,
    closed: AtomicBool,
}

impl DockerEngine {
    /// Create a client from environment-provided defaults
    pub fn from_env() -> Result<Self, RuntimeError> {
        Ok(Self::new(Endpoint::from_env()?))
    }

    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            closed: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Issue a GET and return the response once the status line is in
    async fn get(&self, path: &str) -> Result<Response<Incoming>, RuntimeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RuntimeError::Closed);
        }

        let request = Request::builder()
            .uri(path)
            .header(header::HOST, self.endpoint.host_header())
            .body(Empty::<Bytes>::new())?;

        tracing::debug!(endpoint = %self.endpoint, path, "runtime request");

        let response = match &self.endpoint {
            Endpoint::Unix(socket) => {
                let stream = connect_unix(socket).await.map_err(|source| {
                    RuntimeError::Connect {
                        endpoint: self.endpoint.to_string(),
                        source,
                    }
                })?;
                exchange(stream, request).await?
            }
            Endpoint::Tcp(addr) => {
                let stream =
                    TcpStream::connect(addr)
                        .await
                        .map_err(|source| RuntimeError::Connect {
                            endpoint: self.endpoint.to_string(),
                            source,
                        })?;
                exchange(stream, request).await?
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.into_body().collect().await?.to_bytes();
        let message = serde_json::from_slice::<ApiMessage>(&body)
            .map(|m| m.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());

        Err(RuntimeError::from_status(status.as_u16(), message))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, RuntimeError> {
        let response = self.get(path).await?;
        let body = response.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl Runtime for DockerEngine {
    async fn list_containers(&self) -> Result<Vec<Container>, RuntimeError> {
        let list: Vec<ContainerSummary> = self.get_json("/containers/json").await?;
        Ok(list.into_iter().map(ContainerSummary::into_container).collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        let inspect: ContainerInspect = self.get_json(&format!("/containers/{}/json", id)).await?;
        Ok(inspect.into_details())
    }

    async fn logs(&self, id: &str, options: &LogsOptions) -> Result<ByteStream, RuntimeError> {
        let response = self.get(&logs_path(id, options)).await?;

        Ok(response
            .into_body()
            .into_data_stream()
            .map_err(RuntimeError::from)
            .boxed())
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!(endpoint = %self.endpoint, "runtime client closed");
        Ok(())
    }
}

/// Run one HTTP/1.1 exchange over an established connection
async fn exchange<S>(
    stream: S,
    request: Request<Empty<Bytes>>,
) -> Result<Response<Incoming>, RuntimeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) =
        hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!("runtime connection ended: {}", e);
        }
    });

    Ok(sender.send_request(request).await?)
}

#[cfg(unix)]
async fn connect_unix(socket: &std::path::Path) -> std::io::Result<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(socket).await
}

#[cfg(not(unix))]
async fn connect_unix(_socket: &std::path::Path) -> std::io::Result<TcpStream> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "unix sockets are not available on this platform",
    ))
}

/// Build the `/containers/{id}/logs` path and query
pub fn logs_path(id: &str, options: &LogsOptions) -> String {
    let mut query = vec![
        format!("stdout={}", flag(options.stdout)),
        format!("stderr={}", flag(options.stderr)),
        format!("timestamps={}", flag(options.timestamps)),
        format!("follow={}", flag(options.follow)),
        format!("tail={}", options.tail.as_query()),
    ];

    if let Some(since) = options.since {
        query.push(format!("since={}", unix_timestamp(since)));
    }
    if let Some(until) = options.until {
        query.push(format!("until={}", unix_timestamp(until)));
    }

    format!("/containers/{}/logs?{}", id, query.join("&"))
}

/// Format a timestamp the way the daemon's `since`/`until` filters accept it
pub fn unix_timestamp(ts: DateTime<Utc>) -> String {
    format!("{}.{:09}", ts.timestamp(), ts.timestamp_subsec_nanos())
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    names: Vec<String>,
}

impl ContainerSummary {
    fn into_container(self) -> Container {
        Container::new(self.id, self.names.join(", "))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    id: String,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    config: Option<InspectConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    tty: bool,
}

impl ContainerInspect {
    fn into_details(self) -> ContainerDetails {
        let created = self
            .created
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc));

        ContainerDetails {
            id: self.id,
            tty: self.config.map(|c| c.tty).unwrap_or(false),
            created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dlog_types::Tail;

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            Endpoint::parse("unix:///run/user/1000/docker.sock").unwrap(),
            Endpoint::Unix(PathBuf::from("/run/user/1000/docker.sock"))
        );
        assert_eq!(
            Endpoint::parse("tcp://127.0.0.1:2375/").unwrap(),
            Endpoint::Tcp("127.0.0.1:2375".to_string())
        );
        assert!(Endpoint::parse("ssh://host").is_err());
        assert!(Endpoint::parse("unix://").is_err());
    }

    #[test]
    fn test_logs_path() {
        let options = LogsOptions {
            timestamps: true,
            tail: Tail::Lines(100),
            follow: true,
            since: Some(Utc.timestamp_opt(1_700_000_000, 5).unwrap()),
            ..Default::default()
        };

        assert_eq!(
            logs_path("abc", &options),
            "/containers/abc/logs?stdout=1&stderr=1&timestamps=1&follow=1&tail=100&since=1700000000.000000005"
        );
    }

    #[test]
    fn test_decode_list_and_inspect() {
        let list: Vec<ContainerSummary> = serde_json::from_str(
            r#"[{"Id":"abc123","Names":["/web"],"Image":"nginx"},{"Id":"def456","Names":["/db","/alias"]}]"#,
        )
        .unwrap();
        let containers: Vec<Container> =
            list.into_iter().map(ContainerSummary::into_container).collect();
        assert_eq!(containers[0], Container::new("abc123", "/web"));
        assert_eq!(containers[1].name, "/db, /alias");

        let inspect: ContainerInspect = serde_json::from_str(
            r#"{"Id":"abc123","Created":"2024-01-15T10:30:00.123456789Z","Config":{"Tty":true}}"#,
        )
        .unwrap();
        let details = inspect.into_details();
        assert!(details.tty);
        assert_eq!(
            details.created.unwrap().timestamp(),
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap().timestamp()
        );
    }

    #[cfg(unix)]
    mod fake_daemon {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::UnixListener;

        /// Serve one canned response per connection
        fn serve(listener: UnixListener, responses: Vec<String>) {
            tokio::spawn(async move {
                for response in responses {
                    let Ok((mut stream, _)) = listener.accept().await else {
                        return;
                    };
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        let n = stream.read(&mut buf).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        request.extend_from_slice(&buf[..n]);
                    }
                    stream.write_all(response.as_bytes()).await.unwrap();
                    stream.shutdown().await.unwrap();
                }
            });
        }

        fn http_response(status: &str, body: &str) -> String {
            format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
        }

        #[tokio::test]
        async fn test_list_and_missing_container() {
            let dir = std::env::temp_dir().join(format!("dlog-test-{}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            let socket = dir.join("docker.sock");
            let _ = std::fs::remove_file(&socket);
            let listener = UnixListener::bind(&socket).unwrap();

            serve(
                listener,
                vec![
                    http_response("200 OK", r#"[{"Id":"abc123","Names":["/web"]}]"#),
                    http_response("404 Not Found", r#"{"message":"No such container: nope"}"#),
                ],
            );

            let engine = DockerEngine::new(Endpoint::Unix(socket.clone()));
            let containers = engine.list_containers().await.unwrap();
            assert_eq!(containers, vec![Container::new("abc123", "/web")]);

            let err = engine.inspect("nope").await.unwrap_err();
            assert!(matches!(err, RuntimeError::NotFound(ref m) if m.contains("nope")));

            engine.close().await.unwrap();
            assert!(matches!(
                engine.list_containers().await,
                Err(RuntimeError::Closed)
            ));

            let _ = std::fs::remove_dir_all(&dir);
        }
    }
}
