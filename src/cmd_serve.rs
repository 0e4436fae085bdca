use anyhow::{Context, Result};
use keeper::daemon::{DaemonConfig, DaemonServer};
use keeper::RuntimeConfiguration;
use tracing::info;

pub(crate) async fn cmd_serve(config: &RuntimeConfiguration, report_version: Option<u32>) -> Result<()> {
    let socket = config.socket().context("No socket path configured")?;
    let database = config.database().context("No database path configured")?;

    let mut daemon = DaemonConfig::new(socket, database);
    if let Some(version) = report_version {
        info!(version, "Reporting overridden protocol version");
        daemon.reported_version = version;
    }

    info!(
        pid = std::process::id(),
        socket = %socket.display(),
        database = %database.display(),
        "Daemon starting"
    );
    let server = DaemonServer::bind(daemon)?;
    server.run().await
}
