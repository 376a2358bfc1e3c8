//! Connection supervisor - keeps one device connected.
//!
//! Each supervisor runs on its own tokio task and loops forever:
//! connect, process events until the session ends, wait, reconnect.
//!
//! ```text
//!                ┌────────────┐   open ok   ┌───────────┐
//!  start ───────▶│ Connecting │────────────▶│ Connected │
//!                └─┬──▲───▲───┘             └──┬─────┬──┘
//!         open err │  │   │        peer closed │     │ error
//!                  │  │   │                    ▼     │
//!                  │  │   │  5 s   ┌──────────────┐  │
//!                  │  │   └────────│ Disconnected │  │
//!                  │  │            └──────────────┘  │
//!                  │  │     30 s   ┌──────────────┐  │
//!                  │  └────────────│    Failed    │◀─┘
//!                  │               └──────▲───────┘
//!                  └──────────────────────┘
//! ```
//!
//! `stop()` cancels the supervisor token. The token is checked around
//! every blocking point (connect, event wait, backoff sleep), so a stopped
//! supervisor closes its live connection and exits without sleeping.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Session errors are logged and turned into a retry decision

mod backoff;
mod handler;

pub use backoff::BackoffPolicy;
pub use handler::EventHandler;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vto_core::{Device, DeviceId};

use crate::notify::Notifier;
use crate::session::{SessionClient, SessionError};

/// Connection state of a supervised device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening a session.
    Connecting,
    /// Session is up and events are flowing.
    Connected,
    /// Peer closed the session; reconnecting after `retry_in`.
    Disconnected { retry_in: Duration },
    /// Session failed; reconnecting after `retry_in`.
    Failed { retry_in: Duration, reason: String },
    /// Supervisor has exited.
    Stopped,
}

impl ConnectionState {
    /// Short label for logs and status output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Failed { .. } => "failed",
            Self::Stopped => "stopped",
        }
    }
}

/// Latest state published by a supervisor.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub state: ConnectionState,
    pub since: DateTime<Utc>,
    /// Connection attempts made so far
    pub attempts: u64,
}

impl StateSnapshot {
    fn new(state: ConnectionState, attempts: u64) -> Self {
        Self {
            state,
            since: Utc::now(),
            attempts,
        }
    }
}

/// How one session ended.
#[derive(Debug)]
enum SessionOutcome {
    /// Peer closed the session normally.
    Closed,
    /// Connect or session I/O failed.
    Failed(SessionError),
    /// The supervisor was stopped.
    Cancelled,
}

/// The reconnect loop for one device. Consumed by [`Supervisor::spawn`].
pub struct Supervisor {
    device: Arc<Device>,
    client: Arc<dyn SessionClient>,
    handler: EventHandler,
    policy: BackoffPolicy,
    cancel: CancellationToken,
    state: watch::Sender<StateSnapshot>,
    attempts: u64,
}

impl Supervisor {
    /// Starts supervising `device` on a new task.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to keep connected
    /// * `client` - Opens sessions to the device
    /// * `notifier` - Receives the device's state changes
    /// * `policy` - Reconnect delays
    pub fn spawn(
        device: Arc<Device>,
        client: Arc<dyn SessionClient>,
        notifier: Arc<dyn Notifier>,
        policy: BackoffPolicy,
    ) -> SupervisorHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) =
            watch::channel(StateSnapshot::new(ConnectionState::Connecting, 0));

        let supervisor = Self {
            handler: EventHandler::new(device.id.clone(), notifier),
            device: Arc::clone(&device),
            client,
            policy,
            cancel: cancel.clone(),
            state: state_tx,
            attempts: 0,
        };
        let task = tokio::spawn(supervisor.run());

        SupervisorHandle {
            device,
            cancel,
            task,
            state: state_rx,
        }
    }

    async fn run(mut self) {
        let cancel = self.cancel.clone();
        info!(device_id = %self.device.id, host = %self.device.host, "Supervisor starting");

        while !cancel.is_cancelled() {
            self.attempts += 1;
            self.publish(ConnectionState::Connecting);
            info!(device_id = %self.device.id, attempt = self.attempts, "Connecting");

            let (delay, state) = match self.run_session().await {
                SessionOutcome::Cancelled => break,
                SessionOutcome::Closed => {
                    let delay = self.policy.disconnect_delay;
                    warn!(
                        device_id = %self.device.id,
                        retry_in_secs = delay.as_secs_f64(),
                        "Disconnected, will try to connect again"
                    );
                    (delay, ConnectionState::Disconnected { retry_in: delay })
                }
                SessionOutcome::Failed(e) => {
                    let delay = self.policy.error_delay;
                    error!(
                        device_id = %self.device.id,
                        error = %e,
                        retry_in_secs = delay.as_secs_f64(),
                        "Connection failed, will try to connect again"
                    );
                    debug!(device_id = %self.device.id, error = ?e, "Connection failure detail");
                    (
                        delay,
                        ConnectionState::Failed {
                            retry_in: delay,
                            reason: e.to_string(),
                        },
                    )
                }
            };
            self.publish(state);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.handler.shutdown().await;
        self.publish(ConnectionState::Stopped);
        info!(device_id = %self.device.id, attempts = self.attempts, "Supervisor stopped");
    }

    /// Opens one session and processes its events until it ends.
    async fn run_session(&mut self) -> SessionOutcome {
        let cancel = self.cancel.clone();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionOutcome::Cancelled,
            result = self.client.open(&self.device) => result,
        };
        let mut connection = match opened {
            Ok(connection) => connection,
            Err(e) => return SessionOutcome::Failed(e),
        };

        self.publish(ConnectionState::Connected);
        info!(device_id = %self.device.id, "Connected");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = connection.next_event() => Some(result),
            };

            match next {
                None => {
                    connection.close().await;
                    return SessionOutcome::Cancelled;
                }
                Some(Ok(Some(event))) => self.handler.handle(&event).await,
                Some(Ok(None)) => {
                    connection.close().await;
                    return SessionOutcome::Closed;
                }
                Some(Err(e)) => {
                    connection.close().await;
                    if cancel.is_cancelled() {
                        return SessionOutcome::Cancelled;
                    }
                    return SessionOutcome::Failed(e);
                }
            }
        }
    }

    fn publish(&self, state: ConnectionState) {
        self.state
            .send_replace(StateSnapshot::new(state, self.attempts));
    }
}

/// Owner's handle on a running supervisor.
pub struct SupervisorHandle {
    device: Arc<Device>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    state: watch::Receiver<StateSnapshot>,
}

impl SupervisorHandle {
    /// The supervised device.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The supervised device's id.
    pub fn device_id(&self) -> &DeviceId {
        &self.device.id
    }

    /// Asks the supervisor to stop. Idempotent and non-blocking.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            debug!(device_id = %self.device.id, "Stopping supervisor");
            self.cancel.cancel();
        }
    }

    /// Returns true once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns true once the supervisor task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Latest published state.
    pub fn state(&self) -> StateSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver for state changes.
    pub fn watch_state(&self) -> watch::Receiver<StateSnapshot> {
        self.state.clone()
    }

    /// Stops the supervisor and waits up to `grace` for its task to exit.
    ///
    /// A task that does not exit in time is aborted. Returns true if it
    /// exited on its own.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.stop();
        match timeout(grace, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(device_id = %self.device.id, error = %e, "Supervisor task ended abnormally");
                false
            }
            Err(_) => {
                warn!(device_id = %self.device.id, "Supervisor did not stop in time, aborting");
                self.task.abort();
                false
            }
        }
    }
}
