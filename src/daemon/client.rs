//! Daemon client: `version`, `pid` and `close` over the daemon's socket.

use super::protocol::{ErrorKind, MessageFrame, Request, Response, MAX_FRAME_LEN};
use crate::error::ClientError;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, trace};

/// Default bound on a single round trip.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection to one daemon socket.
///
/// The connection is opened on the first RPC and reopened after any transport
/// failure. `close` consumes the client, so it cannot be used afterwards.
#[derive(Debug)]
pub struct DaemonClient {
    socket_path: PathBuf,
    stream: Option<UnixStream>,
    timeout: Duration,
}

impl DaemonClient {
    /// Create a client for the given socket path. Does not connect.
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            stream: None,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Protocol version the daemon speaks.
    pub async fn version(&mut self) -> Result<u32, ClientError> {
        match self.call(Request::Version).await? {
            Response::Version { version } => Ok(version),
            _ => Err(ClientError::UnexpectedResponse {
                request: Request::Version.name(),
            }),
        }
    }

    /// Process id of the daemon.
    pub async fn pid(&mut self) -> Result<u32, ClientError> {
        match self.call(Request::Pid).await? {
            Response::Pid { pid } => Ok(pid),
            _ => Err(ClientError::UnexpectedResponse {
                request: Request::Pid.name(),
            }),
        }
    }

    /// Release the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        trace!(socket = %self.socket_path.display(), "Closing daemon connection");
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(ClientError::Io(e)),
        }
    }

    async fn call(&mut self, request: Request) -> Result<Response, ClientError> {
        let result = self.round_trip(request).await;
        if result.is_err() {
            // The stream may be mid-frame; never reuse it.
            self.stream = None;
        }

        match result? {
            Response::Error {
                kind: ErrorKind::StorageIncompatible,
                message,
            } => Err(ClientError::IncompatibleStorage(message)),
            Response::Error {
                kind: ErrorKind::Internal,
                message,
            } => Err(ClientError::Remote(message)),
            response => Ok(response),
        }
    }

    async fn round_trip(&mut self, request: Request) -> Result<Response, ClientError> {
        let timeout = self.timeout;

        if self.stream.is_none() {
            let path = self.socket_path.clone();
            let stream = bounded(timeout, UnixStream::connect(&path))
                .await?
                .map_err(|source| ClientError::Connect { path, source })?;
            debug!(socket = %self.socket_path.display(), "Connected to daemon");
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(ClientError::Io(io::ErrorKind::NotConnected.into()));
        };

        let frame = MessageFrame::encode_request(&request)
            .map_err(|e| ClientError::Codec(e.to_string()))?;
        trace!(request = request.name(), len = frame.len(), "Sending request");

        bounded(timeout, async {
            stream.write_all(&frame).await?;
            stream.flush().await?;

            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await?;
            let len = MessageFrame::read_length(&len_buf);
            if len > MAX_FRAME_LEN {
                return Err(ClientError::Codec(format!(
                    "response frame of {} bytes exceeds limit",
                    len
                )));
            }

            let mut body = MessageFrame::body_buffer(len);
            stream.read_exact(&mut body).await?;
            trace!(len, "Response received");

            MessageFrame::decode_response(&body).map_err(|e| ClientError::Codec(e.to_string()))
        })
        .await?
    }
}

async fn bounded<F: Future>(timeout: Duration, fut: F) -> Result<F::Output, ClientError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ClientError::Timeout(timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    /// Serve scripted responses, one per request, on a single connection.
    async fn scripted_daemon(listener: UnixListener, responses: Vec<Response>) {
        let (mut stream, _) = listener.accept().await.unwrap();
        for response in responses {
            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await.unwrap();
            let mut body = vec![0u8; MessageFrame::read_length(&len_buf)];
            stream.read_exact(&mut body).await.unwrap();
            let frame = MessageFrame::encode_response(&response).unwrap();
            stream.write_all(&frame).await.unwrap();
        }
    }

    #[test]
    fn client_creation_does_not_connect() {
        let client = DaemonClient::new("/tmp/keeper-test.sock");
        assert_eq!(client.socket_path(), Path::new("/tmp/keeper-test.sock"));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn missing_socket_is_a_connect_error() {
        let tmp = TempDir::new().unwrap();
        let mut client = DaemonClient::new(tmp.path().join("absent.sock"));
        let err = client.version().await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
        assert!(!err.is_incompatible_storage());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn version_and_pid_share_one_connection() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let daemon = tokio::spawn(scripted_daemon(
            listener,
            vec![Response::Version { version: 7 }, Response::Pid { pid: 4242 }],
        ));

        let mut client = DaemonClient::new(&path);
        assert_eq!(client.version().await.unwrap(), 7);
        assert!(client.is_connected());
        assert_eq!(client.pid().await.unwrap(), 4242);
        client.close().await.unwrap();
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn storage_error_is_surfaced_distinctly() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(scripted_daemon(
            listener,
            vec![Response::Error {
                kind: ErrorKind::StorageIncompatible,
                message: "format 0".to_string(),
            }],
        ));

        let mut client = DaemonClient::new(&path);
        let err = client.version().await.unwrap_err();
        assert!(err.is_incompatible_storage());
    }

    #[tokio::test]
    async fn internal_error_is_remote() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(scripted_daemon(
            listener,
            vec![Response::Error {
                kind: ErrorKind::Internal,
                message: "boom".to_string(),
            }],
        ));

        let mut client = DaemonClient::new(&path);
        let err = client.pid().await.unwrap_err();
        assert!(matches!(err, ClientError::Remote(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn mismatched_response_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(scripted_daemon(listener, vec![Response::Pid { pid: 1 }]));

        let mut client = DaemonClient::new(&path);
        let err = client.version().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedResponse { request: "version" }
        ));
    }

    #[tokio::test]
    async fn silent_peer_times_out_and_drops_the_connection() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let _held = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let mut client = DaemonClient::new(&path).with_timeout(Duration::from_millis(50));
        let err = client.version().await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn closing_an_unused_client_is_fine() {
        let client = DaemonClient::new("/tmp/never-connected.sock");
        client.close().await.unwrap();
    }
}
