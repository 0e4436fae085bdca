//! Database header check done by the daemon at startup.
//!
//! The database begins with an 8-byte magic and a little-endian u32 format
//! number. A missing database is created with the current format; anything
//! else that does not match is reported as incompatible rather than touched.

use crate::error::StorageError;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const STORAGE_MAGIC: &[u8; 8] = b"KEEPERDB";
pub const STORAGE_FORMAT: u32 = 1;

const HEADER_LEN: usize = 12;

/// An opened database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    path: PathBuf,
    format: u32,
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let io_err = |source: io::Error| StorageError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let mut header = Vec::with_capacity(HEADER_LEN);
                header.extend_from_slice(STORAGE_MAGIC);
                header.extend_from_slice(&STORAGE_FORMAT.to_le_bytes());
                file.write_all(&header).map_err(io_err)?;
                file.sync_all().map_err(io_err)?;
                info!(path = %path.display(), format = STORAGE_FORMAT, "Created database");
                return Ok(Self {
                    path: path.to_path_buf(),
                    format: STORAGE_FORMAT,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(io_err(e)),
        }

        let mut header = Vec::with_capacity(HEADER_LEN);
        fs::File::open(path)
            .map_err(io_err)?
            .take(HEADER_LEN as u64)
            .read_to_end(&mut header)
            .map_err(io_err)?;

        let format = parse_header(&header).map_err(|found| StorageError::Incompatible {
            path: path.to_path_buf(),
            found,
            expected: STORAGE_FORMAT,
        })?;
        debug!(path = %path.display(), format, "Opened database");

        Ok(Self {
            path: path.to_path_buf(),
            format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> u32 {
        self.format
    }
}

/// Format number from a header, or a description of what was found instead.
fn parse_header(header: &[u8]) -> Result<u32, String> {
    if header.len() < HEADER_LEN || &header[..8] != STORAGE_MAGIC {
        return Err("unrecognized header".to_string());
    }
    let mut format = [0u8; 4];
    format.copy_from_slice(&header[8..HEADER_LEN]);
    match u32::from_le_bytes(format) {
        STORAGE_FORMAT => Ok(STORAGE_FORMAT),
        other => Err(format!("format {}", other)),
    }
}
