//! Notification sinks.
//!
//! Supervisors report device state changes through the [`Notifier`]
//! trait. Delivery is fire-and-forget: `notify` never blocks on the
//! network and never reports failure to the caller.

mod callback;
mod revert;

pub use callback::{CallbackNotifier, NotifyError};
pub use revert::RevertTimers;

use std::sync::{Mutex, PoisonError};

use tracing::info;
use vto_core::Notification;

/// Accepts state changes and relays them to the controller.
///
/// Implementations must be safe for concurrent calls from many
/// supervisors and timer tasks.
pub trait Notifier: Send + Sync {
    /// Queues one state change.
    fn notify(&self, notification: Notification);
}

/// Sink used when no backend is configured; logs every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            device_id = %notification.device_id,
            field = %notification.field,
            value = notification.value,
            "Device state changed"
        );
    }
}

/// Sink that keeps every change in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    received: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything received so far.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of notifications received so far.
    pub fn len(&self) -> usize {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
