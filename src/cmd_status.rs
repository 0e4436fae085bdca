use anyhow::Result;
use keeper::supervisor::{Outcome, StateKind, Supervised, Supervisor};
use keeper::RuntimeConfiguration;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct StatusReport {
    #[serde(flatten)]
    outcome: Outcome,
    version: Option<u32>,
    pid: Option<u32>,
    socket: PathBuf,
    database: PathBuf,
    data_dir: PathBuf,
    trace: Vec<StateKind>,
}

pub(crate) async fn cmd_status(config: &RuntimeConfiguration, json: bool) -> Result<()> {
    let supervisor = Supervisor::new();
    let Supervised {
        mut client,
        data_dir,
        handle,
        outcome,
        trace,
    } = supervisor.ensure(config).await;

    let mut report = StatusReport {
        outcome,
        version: None,
        pid: None,
        socket: handle.socket_path,
        database: handle.database_path,
        data_dir,
        trace,
    };
    if let Some(client) = client.as_mut() {
        report.version = client.version().await.ok();
        report.pid = client.pid().await.ok();
    }
    supervisor.release(client).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

fn render(report: &StatusReport) -> String {
    let or_dash = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    let or_unset = |p: &PathBuf| {
        if p.as_os_str().is_empty() {
            "(unset)".to_string()
        } else {
            p.display().to_string()
        }
    };

    let mut out = String::new();
    out.push_str(&format!("Daemon:    {}\n", report.outcome));
    if report.outcome == Outcome::Ready {
        out.push_str(&format!("Version:   {}\n", or_dash(report.version)));
        out.push_str(&format!("PID:       {}\n", or_dash(report.pid)));
    }
    out.push_str(&format!("Socket:    {}\n", or_unset(&report.socket)));
    out.push_str(&format!("Database:  {}\n", or_unset(&report.database)));
    out.push_str(&format!("Data dir:  {}\n", report.data_dir.display()));
    out
}
