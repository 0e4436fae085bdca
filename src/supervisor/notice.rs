use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Shown when a daemon reports that its database predates the current storage
/// format.
pub const UPGRADE_NOTICE: &str = "\
error: the daemon database uses an older storage format and cannot be opened.
Running without the daemon for now. To fix this, move the old database aside
(or delete it) and run the command again; a fresh database will be created.
The database location is shown by `keeper paths`.";

/// User-facing warnings produced while supervising the daemon. Rendered to
/// stderr, never to the primary output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SocketUnresponsive { socket: PathBuf, error: String },
    PidUnavailable { error: String },
    KillFailed { pid: u32, error: String },
    SpawnFailed { error: String },
    Timeout { waited: Duration, error: String },
    CloseFailed { error: String },
    UpgradeDatabase,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SocketUnresponsive { socket, error } => write!(
                f,
                "warning: socket {} exists but the daemon is not responding: {}",
                socket.display(),
                error
            ),
            Notice::PidUnavailable { error } => {
                write!(f, "warning: cannot get pid of outdated daemon: {}", error)
            }
            Notice::KillFailed { pid, error } => {
                write!(f, "warning: cannot kill outdated daemon (pid {}): {}", pid, error)
            }
            Notice::SpawnFailed { error } => write!(f, "warning: cannot start daemon: {}", error),
            Notice::Timeout { waited, error } => write!(
                f,
                "warning: cannot connect to daemon after {}ms: {}",
                waited.as_millis(),
                error
            ),
            Notice::CloseFailed { error } => {
                write!(f, "warning: failed to close connection to daemon: {}", error)
            }
            Notice::UpgradeDatabase => f.write_str(UPGRADE_NOTICE),
        }
    }
}
