//! PID marker file bookkeeping.
//!
//! The controller starts the daemon with a PID file path and uses it to
//! tell whether the daemon is alive. Removal is best effort: a missing
//! file is not an error.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use thiserror::Error;
use tracing::debug;

/// Errors writing the PID file.
#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("Failed to create directory for PID file {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write PID file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reads the PID from the PID file, if it exists.
pub fn read_pid(path: &Path) -> Option<u32> {
    let mut file = File::open(path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
///
/// # Errors
///
/// Returns `PidFileError` if the parent directory or the file cannot be
/// written.
pub fn write_pid(path: &Path) -> Result<(), PidFileError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| PidFileError::CreateDir {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    let write = || -> io::Result<()> {
        let mut file = File::create(path)?;
        write!(file, "{}", process::id())
    };
    write().map_err(|source| PidFileError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Removes the PID file, ignoring errors.
///
/// Returns true if a file was removed.
pub fn remove_pid_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "PID file not removed");
            false
        }
    }
}

/// Checks if a process with the given PID is running.
pub fn is_process_running(pid: u32) -> bool {
    // Linux-specific
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Returns the PID of a live daemon owning `path`.
///
/// A PID file left behind by a dead process is removed.
pub fn running_pid(path: &Path) -> Option<u32> {
    if let Some(pid) = read_pid(path) {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file
        remove_pid_file(path);
    }
    None
}
