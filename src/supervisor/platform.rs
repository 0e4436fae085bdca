//! The side effects supervision depends on, behind traits so the state machine
//! can be driven without real sockets or processes.

use super::notice::Notice;
use crate::daemon::client::{DaemonClient, DEFAULT_RPC_TIMEOUT};
use crate::daemon::handle::DaemonHandle;
use crate::daemon::process;
use crate::error::{ClientError, ProcessError, SpawnError};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::time::Duration;

/// RPCs the supervisor makes against a daemon.
#[async_trait]
pub trait DaemonRpc: Send + Sized {
    async fn version(&mut self) -> Result<u32, ClientError>;
    async fn pid(&mut self) -> Result<u32, ClientError>;
    async fn close(self) -> Result<(), ClientError>;
}

#[async_trait]
impl DaemonRpc for DaemonClient {
    async fn version(&mut self) -> Result<u32, ClientError> {
        DaemonClient::version(self).await
    }

    async fn pid(&mut self) -> Result<u32, ClientError> {
        DaemonClient::pid(self).await
    }

    async fn close(self) -> Result<(), ClientError> {
        DaemonClient::close(self).await
    }
}

/// Host operations used by the supervisor.
pub trait Platform: Send + Sync {
    type Client: DaemonRpc;

    /// Whether something exists at the socket path.
    fn socket_exists(&self, path: &Path) -> bool;

    /// A client bound to `path`. Must not perform I/O.
    fn connect(&self, path: &Path) -> Self::Client;

    /// Launch a daemon; returns its pid.
    fn spawn(&self, handle: &DaemonHandle) -> Result<u32, SpawnError>;

    fn terminate(&self, pid: u32) -> Result<(), ProcessError>;

    /// Show a warning to the user.
    fn notify(&self, notice: &Notice);
}

/// The real thing: unix sockets, child processes, stderr.
#[derive(Debug, Clone)]
pub struct SystemPlatform {
    rpc_timeout: Duration,
}

impl SystemPlatform {
    pub fn new() -> Self {
        Self {
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SystemPlatform {
    type Client = DaemonClient;

    fn socket_exists(&self, path: &Path) -> bool {
        // Anything other than "not found" counts; the query decides the rest.
        !matches!(std::fs::metadata(path), Err(e) if e.kind() == io::ErrorKind::NotFound)
    }

    fn connect(&self, path: &Path) -> DaemonClient {
        DaemonClient::new(path).with_timeout(self.rpc_timeout)
    }

    fn spawn(&self, handle: &DaemonHandle) -> Result<u32, SpawnError> {
        handle.spawn()
    }

    fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
        process::terminate(pid)
    }

    fn notify(&self, notice: &Notice) {
        eprintln!("{}", notice);
    }
}
