//! Process control by pid.
//!
//! Pids can be recycled between lookup and signal, so callers treat every
//! failure here as a soft warning.

use crate::error::ProcessError;
use tracing::{debug, info};

/// Kill the process `pid` outright.
///
/// SIGKILL is used so the old daemon cannot run socket cleanup after its
/// replacement has bound the same path.
#[cfg(unix)]
pub fn terminate(pid: u32) -> Result<(), ProcessError> {
    let raw = libc::pid_t::try_from(pid).map_err(|_| ProcessError::InvalidPid(pid))?;
    if raw <= 0 {
        return Err(ProcessError::InvalidPid(pid));
    }
    if pid == std::process::id() {
        return Err(ProcessError::OwnProcess(pid));
    }

    debug!(pid, "Sending SIGKILL");
    // SAFETY: kill has no memory-safety preconditions; pid was checked positive
    // so this never targets a process group.
    if unsafe { libc::kill(raw, libc::SIGKILL) } == 0 {
        info!(pid, "Killed process");
        return Ok(());
    }

    let source = std::io::Error::last_os_error();
    if source.raw_os_error() == Some(libc::ESRCH) {
        Err(ProcessError::NotFound(pid))
    } else {
        Err(ProcessError::Signal { pid, source })
    }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> Result<(), ProcessError> {
    Err(ProcessError::Unsupported)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::{Duration, Instant};

    #[test]
    fn refuses_invalid_and_own_pids() {
        assert!(matches!(terminate(0), Err(ProcessError::InvalidPid(0))));
        assert!(matches!(terminate(u32::MAX), Err(ProcessError::InvalidPid(_))));
        let own = std::process::id();
        assert!(matches!(terminate(own), Err(ProcessError::OwnProcess(p)) if p == own));
    }

    #[test]
    fn kills_a_child_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();

        terminate(pid).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let status = loop {
            if let Some(status) = child.try_wait().unwrap() {
                break status;
            }
            assert!(Instant::now() < deadline, "child survived SIGKILL");
            std::thread::sleep(Duration::from_millis(10));
        };
        assert!(!status.success());
    }

    #[test]
    fn absent_pid_is_not_found() {
        // Above the kernel's pid_max, so never a live process.
        let pid = 0x7fff_fff0;
        assert!(matches!(terminate(pid), Err(ProcessError::NotFound(p)) if p == pid));
    }
}
