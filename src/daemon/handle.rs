//! How to launch a daemon instance.

use crate::config::RuntimeConfiguration;
use crate::error::SpawnError;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

const LOG_SUFFIX_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";

/// Everything needed to start one daemon. Built fresh for each supervision
/// attempt and kept afterwards as a record of what was (or would be) spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonHandle {
    /// Executable to run; the current executable when unset
    pub binary_path: Option<PathBuf>,
    pub database_path: PathBuf,
    pub socket_path: PathBuf,
    /// Log files are this prefix followed by a timestamp
    pub log_path_prefix: PathBuf,
}

impl DaemonHandle {
    pub fn from_config(config: &RuntimeConfiguration) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            database_path: config.database_path.clone().unwrap_or_default(),
            socket_path: config.socket_path.clone().unwrap_or_default(),
            log_path_prefix: config.log_path_prefix(),
        }
    }

    /// Launch the daemon detached from the calling process and return its pid.
    ///
    /// Output goes to a new log file under `log_path_prefix`. Does not wait for
    /// the daemon to accept connections.
    pub fn spawn(&self) -> Result<u32, SpawnError> {
        let binary = self.resolve_binary()?;
        let log_path = self.log_path_at(Local::now().naive_local());
        let stdout = open_log(&log_path)?;
        let stderr = stdout.try_clone().map_err(|source| SpawnError::LogFile {
            path: log_path.clone(),
            source,
        })?;

        debug!(
            binary = %binary.display(),
            database = %self.database_path.display(),
            socket = %self.socket_path.display(),
            log = %log_path.display(),
            "Spawning daemon"
        );

        let mut cmd = Command::new(&binary);
        cmd.arg("serve")
            .arg("--database")
            .arg(absolute(&self.database_path))
            .arg("--socket")
            .arg(absolute(&self.socket_path))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            cmd.current_dir("/");
            // SAFETY: pre_exec runs after fork, before exec. setsid is
            // async-signal-safe and detaches the daemon from our session.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = cmd.spawn().map_err(|source| SpawnError::Launch {
            binary: binary.clone(),
            source,
        })?;
        let pid = child.id();

        // Reap the daemon if it exits while we are still alive.
        let reaper = std::thread::Builder::new()
            .name("keeper-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) => debug!(pid, %status, "Daemon exited"),
                Err(e) => debug!(pid, error = %e, "Could not wait for daemon"),
            });
        if let Err(e) = reaper {
            debug!(pid, error = %e, "Could not start reaper thread");
        }

        info!(pid, log = %log_path.display(), "Spawned daemon");
        Ok(pid)
    }

    /// Log file path for a daemon started at `at`.
    pub fn log_path_at(&self, at: NaiveDateTime) -> PathBuf {
        let mut name = self.log_path_prefix.clone().into_os_string();
        name.push(at.format(LOG_SUFFIX_FORMAT).to_string());
        PathBuf::from(name)
    }

    fn resolve_binary(&self) -> Result<PathBuf, SpawnError> {
        let binary = match &self.binary_path {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(|e| SpawnError::BinaryNotFound {
                binary: PathBuf::from("<current executable>"),
                reason: e.to_string(),
            })?,
        };
        which::which(&binary).map_err(|e| SpawnError::BinaryNotFound {
            binary,
            reason: e.to_string(),
        })
    }
}

fn open_log(path: &Path) -> Result<File, SpawnError> {
    let log_err = |source| SpawnError::LogFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(log_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_err)
}

/// The daemon runs from `/`, so relative paths are resolved here.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
