//! The daemon side and everything a client needs to reach it.
//!
//! ```text
//! ┌────────────┐  rkyv frames over unix socket  ┌──────────────┐
//! │ DaemonClient│ ─────────────────────────────▶ │ DaemonServer │
//! └────────────┘     Version / Pid requests      │   + Storage  │
//!                                                └──────────────┘
//! ```
//!
//! `DaemonHandle` describes how to launch a new server process; `process`
//! holds the pid-level helpers used to replace an outdated one.

pub mod client;
pub mod handle;
pub mod process;
pub mod protocol;
pub mod server;
pub mod storage;

pub use client::DaemonClient;
pub use handle::DaemonHandle;
pub use protocol::{ErrorKind, Request, Response, PROTOCOL_VERSION};
pub use server::{DaemonConfig, DaemonServer};
pub use storage::Storage;
