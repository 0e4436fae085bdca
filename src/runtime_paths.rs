//! Runtime directory resolution.
//!
//! The socket and daemon logs live in a per-user directory that nobody else
//! can write to. When no such directory can be validated the persistent data
//! directory is used instead, so resolution always yields a directory.

use crate::clienv;
use crate::error::PathSecurityError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// A resolved runtime directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    pub path: PathBuf,
    /// True when no secure candidate passed validation and `path` is the
    /// data directory.
    pub degraded: bool,
}

/// Resolve the runtime directory for the current user, falling back to
/// `data_dir`.
pub fn resolve(data_dir: &Path) -> RunDir {
    resolve_from(&clienv::run_dir_candidates(), data_dir)
}

pub fn resolve_from(candidates: &[PathBuf], data_dir: &Path) -> RunDir {
    match secure_run_dir(candidates) {
        Ok(path) => {
            debug!(dir = %path.display(), "Using secure runtime directory");
            RunDir {
                path,
                degraded: false,
            }
        }
        Err(e) => {
            eprintln!(
                "warning: cannot get a secure runtime directory, falling back to data directory {}: {}",
                data_dir.display(),
                e
            );
            RunDir {
                path: data_dir.to_path_buf(),
                degraded: true,
            }
        }
    }
}

/// First candidate that exists (or can be created) with exclusive access for
/// the current user. On failure returns the last candidate's error.
pub fn secure_run_dir(candidates: &[PathBuf]) -> Result<PathBuf, PathSecurityError> {
    let uid = clienv::current_uid();
    let mut last_err = None;

    for candidate in candidates {
        match prepare(candidate, uid) {
            Ok(()) => return Ok(candidate.clone()),
            Err(e) => {
                debug!(dir = %candidate.display(), error = %e, "Rejected runtime directory candidate");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        PathSecurityError::io(
            PathBuf::new(),
            io::Error::new(io::ErrorKind::NotFound, "no runtime directory candidates"),
        )
    }))
}

fn prepare(dir: &Path, uid: u32) -> Result<(), PathSecurityError> {
    create_private_dir(dir)?;
    check_exclusive_access(dir, uid)
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<(), PathSecurityError> {
    use std::os::unix::fs::DirBuilderExt;

    trace!(dir = %dir.display(), "Creating runtime directory");
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|e| PathSecurityError::io(dir, e))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<(), PathSecurityError> {
    trace!(dir = %dir.display(), "Creating runtime directory");
    fs::create_dir_all(dir).map_err(|e| PathSecurityError::io(dir, e))
}

/// Check that `dir` is a directory owned by `uid` with no group or other
/// permission bits.
#[cfg(unix)]
pub fn check_exclusive_access(dir: &Path, uid: u32) -> Result<(), PathSecurityError> {
    use std::os::unix::fs::MetadataExt;

    let meta = fs::metadata(dir).map_err(|e| PathSecurityError::io(dir, e))?;
    if !meta.is_dir() {
        return Err(PathSecurityError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    if meta.uid() != uid {
        return Err(PathSecurityError::BadOwner {
            path: dir.to_path_buf(),
            owner: meta.uid(),
            expected: uid,
        });
    }
    let mode = meta.mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(PathSecurityError::BadPermission {
            path: dir.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn check_exclusive_access(dir: &Path, _uid: u32) -> Result<(), PathSecurityError> {
    let meta = fs::metadata(dir).map_err(|e| PathSecurityError::io(dir, e))?;
    if !meta.is_dir() {
        return Err(PathSecurityError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn creates_missing_candidate_with_private_mode() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("keeper-run");

        let resolved = secure_run_dir(std::slice::from_ref(&dir)).unwrap();
        assert_eq!(resolved, dir);

        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn open_permissions_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("shared");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        let err = check_exclusive_access(&dir, clienv::current_uid()).unwrap_err();
        assert!(matches!(err, PathSecurityError::BadPermission { mode: 0o755, .. }));
    }

    #[test]
    fn group_readable_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("group");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o750)).unwrap();

        let err = check_exclusive_access(&dir, clienv::current_uid()).unwrap_err();
        assert!(matches!(err, PathSecurityError::BadPermission { mode: 0o750, .. }));
    }

    #[test]
    fn foreign_owner_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("mine");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)).unwrap();

        let other = clienv::current_uid().wrapping_add(1);
        let err = check_exclusive_access(&dir, other).unwrap_err();
        assert!(matches!(err, PathSecurityError::BadOwner { expected, .. } if expected == other));
    }

    #[test]
    fn regular_file_is_not_a_directory() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file");
        fs::write(&file, "").unwrap();

        let err = check_exclusive_access(&file, clienv::current_uid()).unwrap_err();
        assert!(matches!(err, PathSecurityError::NotADirectory { .. }));
    }

    #[test]
    fn later_candidate_wins_when_earlier_is_open() {
        let tmp = TempDir::new().unwrap();
        let open = tmp.path().join("open");
        fs::create_dir(&open).unwrap();
        fs::set_permissions(&open, fs::Permissions::from_mode(0o777)).unwrap();
        let private = tmp.path().join("private");

        let resolved = secure_run_dir(&[open, private.clone()]).unwrap();
        assert_eq!(resolved, private);
    }

    #[test]
    fn falls_back_to_data_dir_when_no_candidate_is_secure() {
        let tmp = TempDir::new().unwrap();
        let open = tmp.path().join("open");
        fs::create_dir(&open).unwrap();
        fs::set_permissions(&open, fs::Permissions::from_mode(0o775)).unwrap();
        let data_dir = tmp.path().join("data");

        let run_dir = resolve_from(&[open], &data_dir);
        assert!(run_dir.degraded);
        assert_eq!(run_dir.path, data_dir);
    }

    #[test]
    fn no_candidates_still_yields_a_directory() {
        let data_dir = PathBuf::from("/var/lib/keeper");
        let run_dir = resolve_from(&[], &data_dir);
        assert!(run_dir.degraded);
        assert_eq!(run_dir.path, data_dir);
    }
}
