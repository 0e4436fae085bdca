use std::path::PathBuf;

/// Environment variables read by keeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    KeeperConfigDir,
    KeeperDataDir,
    KeeperRunDir,
    KeeperSocket,
    KeeperDb,
    KeeperBin,
    KeeperLog,
    RustLog,
}

impl EnvVar {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvVar::KeeperConfigDir => "KEEPER_CONFIG_DIR",
            EnvVar::KeeperDataDir => "KEEPER_DATA_DIR",
            EnvVar::KeeperRunDir => "KEEPER_RUN_DIR",
            EnvVar::KeeperSocket => "KEEPER_SOCKET",
            EnvVar::KeeperDb => "KEEPER_DB",
            EnvVar::KeeperBin => "KEEPER_BIN",
            EnvVar::KeeperLog => "KEEPER_LOG",
            EnvVar::RustLog => "RUST_LOG",
        }
    }
}

const FALLBACK_CONFIG_DIR: &str = "~/.config";
const FALLBACK_DATA_DIR: &str = "~/.local/share";
const KEEPER_SUBDIR: &str = "keeper";

/// Value of an env var, treating empty as unset.
pub fn env_opt(var: EnvVar) -> Option<String> {
    std::env::var(var.as_str()).ok().filter(|v| !v.is_empty())
}

fn env_path(var: EnvVar) -> Option<PathBuf> {
    let path = env_opt(var).map(PathBuf::from);
    tracing::trace!(var = var.as_str(), value = ?path, "Path env var");
    path
}

/// Keeper config directory ($KEEPER_CONFIG_DIR or ~/.config/keeper)
pub fn config_dir() -> PathBuf {
    let dir = env_path(EnvVar::KeeperConfigDir).unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(FALLBACK_CONFIG_DIR))
            .join(KEEPER_SUBDIR)
    });
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}

/// Default persistent data directory (~/.local/share/keeper)
pub fn default_data_dir() -> PathBuf {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
        .join(KEEPER_SUBDIR);
    tracing::trace!(dir = %dir.display(), "Default data directory");
    dir
}

/// Data directory override ($KEEPER_DATA_DIR)
pub fn data_dir_override() -> Option<PathBuf> {
    env_path(EnvVar::KeeperDataDir)
}

/// Runtime directory override ($KEEPER_RUN_DIR)
pub fn run_dir_override() -> Option<PathBuf> {
    env_path(EnvVar::KeeperRunDir)
}

/// Daemon socket override ($KEEPER_SOCKET)
pub fn socket_override() -> Option<PathBuf> {
    env_path(EnvVar::KeeperSocket)
}

/// Daemon database override ($KEEPER_DB)
pub fn database_override() -> Option<PathBuf> {
    env_path(EnvVar::KeeperDb)
}

/// Daemon executable override ($KEEPER_BIN)
pub fn binary_override() -> Option<PathBuf> {
    env_path(EnvVar::KeeperBin)
}

/// Log filter directive ($KEEPER_LOG, then $RUST_LOG)
pub fn log_filter() -> Option<String> {
    env_opt(EnvVar::KeeperLog).or_else(|| env_opt(EnvVar::RustLog))
}

/// Per-user runtime directory candidates, most preferred first.
///
/// `$XDG_RUNTIME_DIR/keeper` when the platform has one, then
/// `<tmp>/keeper-<uid>`.
pub fn run_dir_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(runtime) = dirs::runtime_dir() {
        candidates.push(runtime.join(KEEPER_SUBDIR));
    }
    candidates.push(std::env::temp_dir().join(format!("{}-{}", KEEPER_SUBDIR, current_uid())));
    candidates
}

#[cfg(unix)]
pub fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
pub fn current_uid() -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn empty_env_var_counts_as_unset() {
        std::env::set_var(EnvVar::KeeperSocket.as_str(), "");
        assert!(socket_override().is_none());
        std::env::set_var(EnvVar::KeeperSocket.as_str(), "/tmp/k.sock");
        assert_eq!(socket_override(), Some(PathBuf::from("/tmp/k.sock")));
        std::env::remove_var(EnvVar::KeeperSocket.as_str());
    }

    #[test]
    #[serial]
    fn keeper_log_wins_over_rust_log() {
        std::env::set_var(EnvVar::RustLog.as_str(), "info");
        std::env::set_var(EnvVar::KeeperLog.as_str(), "keeper=trace");
        assert_eq!(log_filter().as_deref(), Some("keeper=trace"));
        std::env::remove_var(EnvVar::KeeperLog.as_str());
        assert_eq!(log_filter().as_deref(), Some("info"));
        std::env::remove_var(EnvVar::RustLog.as_str());
    }

    #[test]
    fn tmp_candidate_is_scoped_to_uid() {
        let last = run_dir_candidates().pop().unwrap();
        let name = last.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("keeper-{}", current_uid()));
    }
}
