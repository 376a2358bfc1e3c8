//! Device event handling.

use std::sync::Arc;

use tracing::{debug, info};
use vto_core::{DeviceId, Field, ProtocolEvent};

use crate::notify::{Notifier, RevertTimers};

/// Turns device events into notifications for one device.
pub struct EventHandler {
    device_id: DeviceId,
    timers: RevertTimers,
}

impl EventHandler {
    pub fn new(device_id: DeviceId, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            timers: RevertTimers::new(device_id.clone(), notifier),
            device_id,
        }
    }

    /// Handles one event. Unrecognized events are only logged.
    pub async fn handle(&mut self, event: &ProtocolEvent) {
        debug!(
            device_id = %self.device_id,
            action = %event.action,
            code = %event.code,
            payload = ?event.payload,
            "Event received"
        );

        match Field::from_event(event) {
            Some(field) => {
                info!(device_id = %self.device_id, field = %field, "Raising device flag");
                self.timers.raise(field).await;
            }
            None => debug!(device_id = %self.device_id, "Event ignored"),
        }
    }

    /// Reverts pending flags now; called once when the supervisor stops.
    pub async fn shutdown(&mut self) {
        self.timers.shutdown().await;
    }
}
