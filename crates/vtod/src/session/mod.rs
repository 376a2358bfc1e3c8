//! Device session contract.
//!
//! A [`SessionClient`] opens one connection to a device and the resulting
//! [`Connection`] yields [`ProtocolEvent`]s until the peer closes or the
//! session fails. Supervisors only ever talk to devices through these
//! traits, so the device wire protocol stays behind them.

mod tcp;

pub use tcp::{TcpConnection, TcpEventClient, DEFAULT_CONNECT_TIMEOUT, MAX_FRAME_SIZE};

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use vto_core::{Device, ProtocolEvent};

/// Opens sessions to devices.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Connects and logs in to `device`.
    ///
    /// # Errors
    ///
    /// Any `SessionError`; the caller treats every failure as retryable.
    async fn open(&self, device: &Device) -> Result<Box<dyn Connection>, SessionError>;
}

/// One live device session.
#[async_trait]
pub trait Connection: Send {
    /// Waits for the next event.
    ///
    /// Returns `Ok(None)` when the peer closed the session cleanly. Callers
    /// may drop this future mid-wait when they stop; the connection is
    /// closed right after, so partially read data does not matter.
    ///
    /// # Errors
    ///
    /// `SessionError` on I/O or protocol failure.
    async fn next_event(&mut self) -> Result<Option<ProtocolEvent>, SessionError>;

    /// Closes the session. Never fails; errors are logged.
    async fn close(&mut self);
}

/// Errors that end a device session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),
}
