use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a candidate runtime directory was rejected.
#[derive(Error, Debug)]
pub enum PathSecurityError {
    #[error("bad owner: {path} is owned by uid {owner}, expected uid {expected}")]
    BadOwner {
        path: PathBuf,
        owner: u32,
        expected: u32,
    },

    #[error("bad permission: {path} has mode {mode:o}, group and other bits must be clear")]
    BadPermission { path: PathBuf, mode: u32 },

    #[error("{path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("cannot prepare {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl PathSecurityError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure talking to a daemon over its socket.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cannot connect to {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },

    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("malformed frame: {0}")]
    Codec(String),

    #[error("daemon error: {0}")]
    Remote(String),

    /// The daemon could not open its database because the on-disk format
    /// predates the current protocol. Retrying never helps.
    #[error("incompatible database: {0}")]
    IncompatibleStorage(String),

    #[error("unexpected response to {request} request")]
    UnexpectedResponse { request: &'static str },
}

impl ClientError {
    pub fn is_incompatible_storage(&self) -> bool {
        matches!(self, Self::IncompatibleStorage(_))
    }
}

/// Failure launching a daemon process.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("cannot locate daemon executable {binary}: {reason}")]
    BinaryNotFound { binary: PathBuf, reason: String },

    #[error("cannot create log file {path}: {source}")]
    LogFile { path: PathBuf, source: io::Error },

    #[error("failed to launch {binary}: {source}")]
    Launch { binary: PathBuf, source: io::Error },
}

/// Failure terminating a process by pid.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("invalid pid {0}")]
    InvalidPid(u32),

    #[error("refusing to terminate own process {0}")]
    OwnProcess(u32),

    #[error("no process with pid {0}")]
    NotFound(u32),

    #[error("cannot signal pid {pid}: {source}")]
    Signal { pid: u32, source: io::Error },

    #[error("process termination is not supported on this platform")]
    Unsupported,
}

/// Failure opening the daemon's database marker.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database {path} uses an incompatible storage format ({found}), expected format {expected}")]
    Incompatible {
        path: PathBuf,
        found: String,
        expected: u32,
    },

    #[error("cannot open database {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl StorageError {
    pub fn is_incompatible(&self) -> bool {
        matches!(self, Self::Incompatible { .. })
    }
}

/// Failure loading the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
