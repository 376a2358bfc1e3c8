//! Control channel - authenticates control messages and drives the registry.
//!
//! Messages arrive as raw lines on an mpsc queue fed by the control
//! server. Each line is decoded, checked against the shared secret and
//! dispatched in arrival order. A bad line is logged and dropped; only a
//! `stop` command (or cancellation) ends the loop.
//!
//! Raw lines are never logged since `add` messages carry device passwords.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vto_protocol::{Command, ControlMessage, MessageError};

use crate::registry::{AddOutcome, RegistryError, RegistryHandle};

/// What the loop does after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Why the control loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelExit {
    /// A `stop` command was processed; every supervisor is stopped.
    StopRequested,
    /// The shutdown token fired.
    Cancelled,
    /// Every queue sender was dropped.
    QueueClosed,
}

/// Failure handling one control message.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Authenticating dispatcher between the control transport and the registry.
pub struct ControlChannel {
    apikey: String,
    registry: RegistryHandle,
    cancel: CancellationToken,
}

impl ControlChannel {
    /// Creates a control channel.
    ///
    /// # Arguments
    ///
    /// * `apikey` - Shared secret every message must present
    /// * `registry` - Registry the commands act on
    /// * `cancel` - Root token; cancelled when a `stop` command is processed
    pub fn new(apikey: impl Into<String>, registry: RegistryHandle, cancel: CancellationToken) -> Self {
        Self {
            apikey: apikey.into(),
            registry,
            cancel,
        }
    }

    /// Processes queued messages until stopped.
    pub async fn run(&self, mut queue: mpsc::Receiver<String>) -> ChannelExit {
        info!("Control channel ready");

        let exit = loop {
            let line = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break ChannelExit::Cancelled,
                line = queue.recv() => line,
            };
            let Some(line) = line else {
                break ChannelExit::QueueClosed;
            };

            match self.handle_line(&line).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break ChannelExit::StopRequested,
                Err(ControlError::Message(MessageError::Unauthorized)) => {
                    error!("Invalid apikey, control message dropped");
                }
                Err(e) => {
                    error!(error = %e, "Failed to handle control message");
                    debug!(error = ?e, bytes = line.len(), "Control message failure detail");
                }
            }
        };

        info!(reason = ?exit, "Control channel stopped");
        exit
    }

    /// Decodes, authenticates and dispatches one raw message.
    ///
    /// # Errors
    ///
    /// `ControlError::Message` when the message is malformed, carries the
    /// wrong apikey or names no usable command; `ControlError::Registry`
    /// when the registry rejects or cannot take the command.
    pub async fn handle_line(&self, line: &str) -> Result<Flow, ControlError> {
        let message = ControlMessage::decode(line)?;
        message.authenticate(&self.apikey)?;
        let command = message.command()?;
        self.dispatch(command).await
    }

    /// Applies an authenticated command to the registry.
    ///
    /// `Stop` always yields `Flow::Stop` and cancels the root token, even
    /// if the registry is already gone.
    ///
    /// # Errors
    ///
    /// `ControlError::Registry` for a failed `add` or `remove`.
    pub async fn dispatch(&self, command: Command) -> Result<Flow, ControlError> {
        debug!(cmd = command.name(), "Dispatching control command");

        match command {
            Command::Add(device) => {
                let device_id = device.id.clone();
                let host = device.host.clone();
                let outcome = self.registry.add(device).await?;
                info!(
                    device_id = %device_id,
                    host = %host,
                    replaced = outcome == AddOutcome::Replaced,
                    "Device supervision started"
                );
                Ok(Flow::Continue)
            }
            Command::Remove(device_id) => {
                if self.registry.remove(device_id.clone()).await? {
                    info!(device_id = %device_id, "Device supervision stopped");
                } else {
                    debug!(device_id = %device_id, "Remove for unknown device ignored");
                }
                Ok(Flow::Continue)
            }
            Command::Stop => {
                match self.registry.stop_all().await {
                    Ok(count) => info!(stopped = count, "Stop requested, all devices stopped"),
                    Err(e) => warn!(error = %e, "Stop requested, registry unavailable"),
                }
                self.cancel.cancel();
                Ok(Flow::Stop)
            }
        }
    }
}
