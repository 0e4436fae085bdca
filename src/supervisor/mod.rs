//! Daemon supervision: find a compatible daemon or bring one up.
//!
//! ```text
//! Start ─▶ ProbeSocket ─(absent)──────────────────────▶ SpawnNew ─▶ AwaitReady
//!   │           │                                           ▲           │
//!   ▼           ▼ (present)                                 │           ▼
//! Degraded  QueryRunning ─(outdated)─▶ KillOutdated ────────┘      Ready / Aborted
//!               │
//!               ▼
//!         Ready / Aborted
//! ```
//!
//! Every failure ends in "no client"; nothing here is fatal to the caller.

pub mod notice;
pub mod platform;
pub mod state;


pub use notice::{Notice, UPGRADE_NOTICE};
pub use platform::{DaemonRpc, Platform, SystemPlatform};
pub use state::{AbortReason, Outcome, State, StateKind};

use crate::config::RuntimeConfiguration;
use crate::daemon::handle::DaemonHandle;
use crate::daemon::protocol::PROTOCOL_VERSION;
use crate::error::ClientError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Pause between readiness checks.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(10);
/// Number of pauses; one more check than this is made.
pub const DEFAULT_WAIT_LOOPS: u32 = 100;

/// Result of [`Supervisor::ensure`].
#[derive(Debug)]
pub struct Supervised<C> {
    /// Ready connection, if any. Hand it back through [`Supervisor::release`].
    pub client: Option<C>,
    pub data_dir: PathBuf,
    /// What was (or would have been) spawned.
    pub handle: DaemonHandle,
    pub outcome: Outcome,
    /// States visited, in order.
    pub trace: Vec<StateKind>,
}

impl<C> Supervised<C> {
    pub fn is_ready(&self) -> bool {
        self.outcome == Outcome::Ready
    }

    pub fn into_parts(self) -> (Option<C>, PathBuf) {
        (self.client, self.data_dir)
    }
}

pub struct Supervisor<P: Platform = SystemPlatform> {
    platform: P,
    required_version: u32,
    wait_interval: Duration,
    wait_loops: u32,
}

impl Supervisor<SystemPlatform> {
    pub fn new() -> Self {
        Self::with_platform(SystemPlatform::new())
    }
}

impl Default for Supervisor<SystemPlatform> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> Supervisor<P> {
    pub fn with_platform(platform: P) -> Self {
        Self {
            platform,
            required_version: PROTOCOL_VERSION,
            wait_interval: DEFAULT_WAIT_INTERVAL,
            wait_loops: DEFAULT_WAIT_LOOPS,
        }
    }

    /// Lowest daemon version accepted.
    pub fn required_version(mut self, version: u32) -> Self {
        self.required_version = version;
        self
    }

    pub fn wait_budget(mut self, interval: Duration, loops: u32) -> Self {
        self.wait_interval = interval;
        self.wait_loops = loops;
        self
    }

    /// Make sure a compatible daemon is running and return a connection to it.
    ///
    /// Never fails: when no daemon can be used the result carries no client and
    /// the reason is in `outcome`.
    pub async fn ensure(&self, config: &RuntimeConfiguration) -> Supervised<P::Client> {
        let handle = DaemonHandle::from_config(config);
        let mut trace = Vec::new();
        let mut state = State::Start;

        loop {
            trace.push(state.kind());
            match state.finish() {
                Ok((client, outcome)) => {
                    debug!(?outcome, ?trace, "Supervision finished");
                    return Supervised {
                        client,
                        data_dir: config.data_dir.clone(),
                        handle,
                        outcome,
                        trace,
                    };
                }
                Err(next) => state = self.step(next, &handle).await,
            }
        }
    }

    /// Close a connection obtained from [`ensure`](Self::ensure).
    pub async fn release(&self, client: Option<P::Client>) {
        let Some(client) = client else {
            return;
        };
        if let Err(e) = client.close().await {
            self.platform.notify(&Notice::CloseFailed {
                error: e.to_string(),
            });
        }
    }

    async fn step(&self, state: State<P::Client>, handle: &DaemonHandle) -> State<P::Client> {
        trace!(state = ?state.kind(), "Supervision step");
        match state {
            State::Start => self.start(handle),
            State::ProbeSocket => self.check_socket(handle),
            State::QueryRunning(client) => self.query_running(client, handle).await,
            State::KillOutdated(client) => self.kill_outdated(client).await,
            State::SpawnNew => self.spawn_new(handle),
            State::AwaitReady => self.await_ready(handle).await,
            terminal => terminal,
        }
    }

    fn start(&self, handle: &DaemonHandle) -> State<P::Client> {
        if handle.socket_path.as_os_str().is_empty() || handle.database_path.as_os_str().is_empty() {
            debug!("No socket or database path; running without daemon");
            return State::Degraded;
        }
        State::ProbeSocket
    }

    fn check_socket(&self, handle: &DaemonHandle) -> State<P::Client> {
        if self.platform.socket_exists(&handle.socket_path) {
            State::QueryRunning(self.platform.connect(&handle.socket_path))
        } else {
            debug!(socket = %handle.socket_path.display(), "No socket; spawning daemon");
            State::SpawnNew
        }
    }

    async fn query_running(&self, mut client: P::Client, handle: &DaemonHandle) -> State<P::Client> {
        match client.version().await {
            Ok(version) if version >= self.required_version => {
                debug!(version, "Reusing running daemon");
                State::Ready(client)
            }
            Ok(version) => {
                info!(
                    version,
                    required = self.required_version,
                    "Running daemon is outdated; replacing it"
                );
                State::KillOutdated(client)
            }
            Err(e) => {
                let reason = self.rpc_failed(&e);
                if reason == AbortReason::Unresponsive {
                    self.platform.notify(&Notice::SocketUnresponsive {
                        socket: handle.socket_path.clone(),
                        error: e.to_string(),
                    });
                }
                self.discard(client).await;
                State::Aborted(reason)
            }
        }
    }

    async fn kill_outdated(&self, mut client: P::Client) -> State<P::Client> {
        let pid = client.pid().await;
        self.discard(client).await;

        let pid = match pid {
            Ok(pid) => pid,
            Err(e) => {
                self.platform.notify(&Notice::PidUnavailable {
                    error: e.to_string(),
                });
                return State::Aborted(AbortReason::PidUnavailable);
            }
        };

        match self.platform.terminate(pid) {
            Ok(()) => {
                info!(pid, "Killed outdated daemon");
                State::SpawnNew
            }
            Err(e) => {
                self.platform.notify(&Notice::KillFailed {
                    pid,
                    error: e.to_string(),
                });
                State::Aborted(AbortReason::KillFailed)
            }
        }
    }

    fn spawn_new(&self, handle: &DaemonHandle) -> State<P::Client> {
        // A failed spawn still waits: a daemon may come up by other means.
        match self.platform.spawn(handle) {
            Ok(pid) => debug!(pid, "Daemon spawned"),
            Err(e) => self.platform.notify(&Notice::SpawnFailed {
                error: e.to_string(),
            }),
        }
        State::AwaitReady
    }

    async fn await_ready(&self, handle: &DaemonHandle) -> State<P::Client> {
        let mut client = self.platform.connect(&handle.socket_path);
        let mut last_error = String::new();

        for attempt in 0..=self.wait_loops {
            match client.version().await {
                Ok(version) if version >= self.required_version => {
                    info!(attempt, version, "Daemon online");
                    return State::Ready(client);
                }
                Ok(version) => {
                    last_error = format!(
                        "daemon reports version {}, need {}",
                        version, self.required_version
                    );
                }
                Err(e) if e.is_incompatible_storage() => {
                    self.rpc_failed(&e);
                    self.discard(client).await;
                    return State::Aborted(AbortReason::IncompatibleStorage);
                }
                Err(e) => {
                    trace!(attempt, error = %e, "Daemon not ready");
                    last_error = e.to_string();
                }
            }
            if attempt < self.wait_loops {
                tokio::time::sleep(self.wait_interval).await;
            }
        }

        self.platform.notify(&Notice::Timeout {
            waited: self.wait_interval * self.wait_loops,
            error: last_error,
        });
        self.discard(client).await;
        State::Aborted(AbortReason::TimedOut)
    }

    /// Classify a failed RPC, printing the upgrade notice when it applies.
    fn rpc_failed(&self, error: &ClientError) -> AbortReason {
        if error.is_incompatible_storage() {
            self.platform.notify(&Notice::UpgradeDatabase);
            AbortReason::IncompatibleStorage
        } else {
            AbortReason::Unresponsive
        }
    }

    async fn discard(&self, client: P::Client) {
        if let Err(e) = client.close().await {
            debug!(error = %e, "Closing unused daemon connection failed");
        }
    }
}
