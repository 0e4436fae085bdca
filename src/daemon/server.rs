use super::protocol::{ArchivedRequest, ErrorKind, MessageFrame, Response, MAX_FRAME_LEN, PROTOCOL_VERSION};
use super::storage::Storage;
use anyhow::{Context, Result};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub database_path: PathBuf,
    /// Version answered to `Version` requests
    pub reported_version: u32,
}

impl DaemonConfig {
    pub fn new(socket_path: impl Into<PathBuf>, database_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            database_path: database_path.into(),
            reported_version: PROTOCOL_VERSION,
        }
    }
}

/// A bound daemon, ready to serve.
pub struct DaemonServer {
    config: DaemonConfig,
    listener: UnixListener,
    /// Set when the database could not be used; reported on `Version`
    storage_error: Option<String>,
}

struct Handler {
    reported_version: u32,
    storage_error: Option<String>,
}

impl DaemonServer {
    /// Open the database and bind the socket. Must be called inside a tokio
    /// runtime.
    ///
    /// An incompatible database does not prevent serving; clients learn about
    /// it from the `Version` reply.
    pub fn bind(config: DaemonConfig) -> Result<Self> {
        let storage_error = match Storage::open(&config.database_path) {
            Ok(storage) => {
                debug!(path = %storage.path().display(), format = storage.format(), "Database ready");
                None
            }
            Err(e) if e.is_incompatible() => {
                warn!("{}", e);
                Some(e.to_string())
            }
            Err(e) => return Err(e.into()),
        };

        let socket_path = &config.socket_path;
        if socket_path.symlink_metadata().is_ok() {
            debug!(path = %socket_path.display(), "Removing stale socket");
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove stale socket {}", socket_path.display()))?;
        }
        if let Some(parent) = socket_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind {}", socket_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(socket_path, perms)?;
        }

        info!("IPC server listening on: {}", socket_path.display());

        Ok(Self {
            config,
            listener,
            storage_error,
        })
    }

    /// Serve until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        self.serve_until(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        })
        .await
    }

    /// Serve until `shutdown` completes, then remove the socket.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let DaemonServer {
            config,
            listener,
            storage_error,
        } = self;
        let handler = Arc::new(Handler {
            reported_version: config.reported_version,
            storage_error,
        });

        info!(pid = std::process::id(), "Daemon ready");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                conn = listener.accept() => {
                    match conn {
                        Ok((stream, _)) => {
                            let handler = Arc::clone(&handler);
                            tokio::spawn(async move {
                                if let Err(e) = handler.handle_connection(stream).await {
                                    error!("Connection handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);
        match std::fs::remove_file(&config.socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove socket {}: {}", config.socket_path.display(), e),
        }

        info!("Daemon stopped");
        Ok(())
    }
}

impl Handler {
    /// Answer requests on one connection until the peer hangs up.
    async fn handle_connection(&self, mut stream: UnixStream) -> Result<()> {
        trace!("New connection accepted");

        loop {
            let mut len_buf = [0u8; 4];
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    trace!("Connection closed by peer");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
            let len = MessageFrame::read_length(&len_buf);
            if len > MAX_FRAME_LEN {
                anyhow::bail!("Request frame of {} bytes exceeds limit", len);
            }
            trace!("Request length: {} bytes", len);

            let mut request_buf = MessageFrame::body_buffer(len);
            stream.read_exact(&mut request_buf).await?;

            let archived = rkyv::access::<ArchivedRequest, rkyv::rancor::Error>(&request_buf)
                .map_err(|e| anyhow::anyhow!("Failed to deserialize request: {}", e))?;

            let response = self.handle_request(archived);

            let response_bytes = MessageFrame::encode_response(&response)
                .map_err(|e| anyhow::anyhow!("Failed to encode response: {}", e))?;
            stream.write_all(&response_bytes).await?;
            stream.flush().await?;

            trace!("Response sent");
        }
    }

    fn handle_request(&self, request: &ArchivedRequest) -> Response {
        match request {
            ArchivedRequest::Version => {
                debug!("Handling: Version");
                match &self.storage_error {
                    Some(message) => Response::Error {
                        kind: ErrorKind::StorageIncompatible,
                        message: message.clone(),
                    },
                    None => Response::Version {
                        version: self.reported_version,
                    },
                }
            }
            ArchivedRequest::Pid => {
                debug!("Handling: Pid");
                Response::Pid {
                    pid: std::process::id(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::client::DaemonClient;
    use crate::daemon::storage::STORAGE_MAGIC;
    use tempfile::TempDir;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    fn start(config: DaemonConfig) -> (oneshot::Sender<()>, JoinHandle<Result<()>>) {
        let server = DaemonServer::bind(config).unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_until(async move {
            let _ = rx.await;
        }));
        (tx, task)
    }

    #[test]
    fn config_reports_current_version() {
        let config = DaemonConfig::new("/run/k/sock", "/data/db");
        assert_eq!(config.reported_version, PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn answers_version_and_pid_then_removes_socket() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("sock");
        let (stop, task) = start(DaemonConfig::new(&socket, tmp.path().join("db")));

        let mut client = DaemonClient::new(&socket);
        assert_eq!(client.version().await.unwrap(), PROTOCOL_VERSION);
        assert_eq!(client.pid().await.unwrap(), std::process::id());
        client.close().await.unwrap();

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn socket_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("sock");
        let (_stop, _task) = start(DaemonConfig::new(&socket, tmp.path().join("db")));

        let mode = std::fs::metadata(&socket).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn replaces_stale_socket_file() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("sock");
        std::fs::write(&socket, b"stale").unwrap();

        let (_stop, _task) = start(DaemonConfig::new(&socket, tmp.path().join("db")));
        let mut client = DaemonClient::new(&socket);
        assert_eq!(client.version().await.unwrap(), PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn incompatible_database_is_reported_on_version_only() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("sock");
        let db = tmp.path().join("db");
        let mut header = STORAGE_MAGIC.to_vec();
        header.extend_from_slice(&0u32.to_le_bytes());
        std::fs::write(&db, header).unwrap();

        let (_stop, _task) = start(DaemonConfig::new(&socket, &db));
        let mut client = DaemonClient::new(&socket);
        assert!(client.version().await.unwrap_err().is_incompatible_storage());
        assert_eq!(client.pid().await.unwrap(), std::process::id());
    }

    #[tokio::test]
    async fn reported_version_is_configurable() {
        let tmp = TempDir::new().unwrap();
        let socket = tmp.path().join("sock");
        let mut config = DaemonConfig::new(&socket, tmp.path().join("db"));
        config.reported_version = 0;

        let (_stop, _task) = start(config);
        let mut client = DaemonClient::new(&socket);
        assert_eq!(client.version().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreadable_database_fails_startup() {
        let tmp = TempDir::new().unwrap();
        // A directory where the database file should be
        let db = tmp.path().join("db");
        std::fs::create_dir(&db).unwrap();

        let result = DaemonServer::bind(DaemonConfig::new(tmp.path().join("sock"), &db));
        assert!(result.is_err());
    }
}
