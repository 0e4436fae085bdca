use clap::{Args, Parser, Subcommand};
use keeper::completions::CompletionShell;
use keeper::config::Overrides;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keeper")]
#[command(version)]
#[command(about = "Start, find and hand out connections to the keeper daemon", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub paths: PathArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Path settings shared by every command. Each also has a `KEEPER_*`
/// environment variable and a config file key.
#[derive(Args, Debug, Default)]
pub(crate) struct PathArgs {
    /// Daemon executable to spawn (default: this executable)
    #[arg(long, global = true, value_name = "PATH")]
    pub binary: Option<PathBuf>,

    /// Daemon socket (default: <run-dir>/sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Daemon database (default: <data-dir>/db)
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Persistent data directory
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Runtime directory for the socket and daemon logs
    #[arg(long, global = true, value_name = "DIR")]
    pub run_dir: Option<PathBuf>,
}

impl From<PathArgs> for Overrides {
    fn from(args: PathArgs) -> Self {
        Overrides {
            binary_path: args.binary,
            socket_path: args.socket,
            database_path: args.database,
            data_dir: args.data_dir,
            run_dir: args.run_dir,
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Make sure a compatible daemon is running and report on it
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved daemon paths
    Paths {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the daemon in the foreground (this is what gets spawned)
    Serve {
        /// Answer version requests with this number instead of the built-in one
        #[arg(long, hide = true, value_name = "N")]
        report_version: Option<u32>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}
