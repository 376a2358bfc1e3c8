//! Process shutdown.
//!
//! Every cleanup step is best effort: failures are logged at debug level
//! and never change the exit status.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use tracing::{debug, info};

use crate::pidfile;

/// Final cleanup for the daemon process.
#[derive(Debug, Clone)]
pub struct Shutdown {
    pid_file: PathBuf,
}

impl Shutdown {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
        }
    }

    /// Removes the PID file and flushes stdout/stderr.
    pub fn cleanup(&self) {
        if pidfile::remove_pid_file(&self.pid_file) {
            debug!(path = %self.pid_file.display(), "PID file removed");
        }
        if let Err(e) = io::stdout().flush() {
            debug!(error = %e, "Failed to flush stdout");
        }
        if let Err(e) = io::stderr().flush() {
            debug!(error = %e, "Failed to flush stderr");
        }
    }

    /// Runs [`Shutdown::cleanup`] and exits with status 0.
    pub fn exit(self) -> ! {
        info!("Shutdown");
        self.cleanup();
        process::exit(0)
    }
}
