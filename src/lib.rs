//! Supervision of a per-user background daemon reached over a unix socket.
//!
//! [`supervisor::Supervisor::ensure`] finds a compatible daemon, replaces an
//! outdated one, or spawns a fresh one, and hands back a ready
//! [`daemon::DaemonClient`]. When no daemon can be used the caller gets no
//! client and carries on without it.

pub mod clienv;
pub mod completions;
pub mod config;
pub mod daemon;
pub mod error;
pub mod runtime_paths;
pub mod supervisor;

pub use config::RuntimeConfiguration;
pub use daemon::{DaemonClient, DaemonHandle};
pub use error::{ClientError, PathSecurityError, ProcessError, SpawnError};
pub use supervisor::{Outcome, Supervised, Supervisor};
