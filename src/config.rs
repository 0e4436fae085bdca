use crate::clienv;
use crate::error::ConfigError;
use crate::runtime_paths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SOCKET_NAME: &str = "sock";
const DATABASE_NAME: &str = "db";
const LOG_PREFIX: &str = "daemon.log-";

/// Persistent settings from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserConfig {
    /// Daemon executable to spawn
    pub binary_path: Option<PathBuf>,
    /// Socket the daemon listens on
    pub socket_path: Option<PathBuf>,
    /// Database the daemon serves
    pub database_path: Option<PathBuf>,
    /// Persistent data directory
    pub data_dir: Option<PathBuf>,
    /// Runtime directory for the socket and daemon logs
    pub run_dir: Option<PathBuf>,
}

impl UserConfig {
    /// $KEEPER_CONFIG_DIR/config.toml or ~/.config/keeper/config.toml
    pub fn config_path() -> PathBuf {
        clienv::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        tracing::trace!(path = %path.display(), "Loading user config");

        if !path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::trace!(?config, "User config loaded");
        Ok(config)
    }
}

/// One layer of path settings (command line or environment).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub binary_path: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub run_dir: Option<PathBuf>,
}

impl Overrides {
    /// Settings taken from `KEEPER_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            binary_path: clienv::binary_override(),
            socket_path: clienv::socket_override(),
            database_path: clienv::database_override(),
            data_dir: clienv::data_dir_override(),
            run_dir: clienv::run_dir_override(),
        }
    }
}

/// Everything needed to find, talk to, and launch the daemon. Resolved once at
/// startup.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RuntimeConfiguration {
    pub binary_path: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub run_dir: PathBuf,
    /// The secure runtime directory could not be used and `run_dir` is the
    /// data directory.
    pub run_dir_degraded: bool,
}

impl RuntimeConfiguration {
    /// Resolve from command line values, then `KEEPER_*` variables, then the
    /// config file, then defaults.
    pub fn resolve(cli: Overrides) -> Self {
        let file = UserConfig::load().unwrap_or_else(|e| {
            eprintln!("warning: {}, using defaults", e);
            UserConfig::default()
        });
        Self::resolve_layers(cli, Overrides::from_env(), file)
    }

    pub fn resolve_layers(cli: Overrides, env: Overrides, file: UserConfig) -> Self {
        let data_dir = first(cli.data_dir, env.data_dir, file.data_dir)
            .unwrap_or_else(clienv::default_data_dir);
        let data_dir_ready = ensure_data_dir(&data_dir);

        let database_path = first(cli.database_path, env.database_path, file.database_path)
            .or_else(|| data_dir_ready.then(|| data_dir.join(DATABASE_NAME)));

        let (run_dir, run_dir_degraded) = match first(cli.run_dir, env.run_dir, file.run_dir) {
            Some(dir) => (dir, false),
            None => {
                let resolved = runtime_paths::resolve(&data_dir);
                (resolved.path, resolved.degraded)
            }
        };

        let socket_path = first(cli.socket_path, env.socket_path, file.socket_path)
            .unwrap_or_else(|| run_dir.join(SOCKET_NAME));

        let binary_path = first(cli.binary_path, env.binary_path, file.binary_path)
            .or_else(|| std::env::current_exe().ok());

        let config = Self {
            binary_path,
            socket_path: Some(socket_path),
            database_path,
            data_dir,
            run_dir,
            run_dir_degraded,
        };
        tracing::debug!(?config, "Resolved runtime configuration");
        config
    }

    /// Daemon log files are `<prefix><timestamp>`.
    pub fn log_path_prefix(&self) -> PathBuf {
        self.run_dir.join(LOG_PREFIX)
    }

    /// Socket path, unless missing or empty.
    pub fn socket(&self) -> Option<&Path> {
        non_empty(self.socket_path.as_deref())
    }

    /// Database path, unless missing or empty.
    pub fn database(&self) -> Option<&Path> {
        non_empty(self.database_path.as_deref())
    }
}

fn non_empty(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

fn first(a: Option<PathBuf>, b: Option<PathBuf>, c: Option<PathBuf>) -> Option<PathBuf> {
    let non_empty = |p: &PathBuf| !p.as_os_str().is_empty();
    a.filter(non_empty)
        .or_else(|| b.filter(non_empty))
        .or_else(|| c.filter(non_empty))
}

fn ensure_data_dir(dir: &Path) -> bool {
    match fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            eprintln!(
                "warning: cannot create data directory {}: {}",
                dir.display(),
                e
            );
            false
        }
    }
}
