mod args;
mod cmd_completions;
mod cmd_paths;
mod cmd_serve;
mod cmd_status;

use args::{Cli, Commands, PathArgs};
use clap::Parser;
use keeper::{clienv, RuntimeConfiguration};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let Cli { paths, command } = Cli::parse();
    init_logging(matches!(command, Commands::Serve { .. }));

    match command {
        Commands::Completions { shell } => cmd_completions::cmd_completions(shell),
        Commands::Status { json } => cmd_status::cmd_status(&resolve(paths), json).await?,
        Commands::Paths { json } => cmd_paths::cmd_paths(&resolve(paths), json)?,
        Commands::Serve { report_version } => {
            cmd_serve::cmd_serve(&resolve(paths), report_version).await?
        }
    }

    Ok(())
}

fn resolve(paths: PathArgs) -> RuntimeConfiguration {
    RuntimeConfiguration::resolve(paths.into())
}

/// Logs go to stderr; for a spawned daemon that is its log file.
fn init_logging(serving: bool) {
    let default = if serving { "info" } else { "warn" };
    let filter = clienv::log_filter()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
