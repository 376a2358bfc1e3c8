//! Self-reverting flag timers.
//!
//! Raising a field emits value 1 right away and schedules value 0 after
//! the field's revert delay. A raise while a revert is still pending for
//! the same `(device, field)` replaces it, so the flag drops only after
//! the *latest* event's delay has elapsed.
//!
//! Timers belong to one supervisor. When it stops, [`RevertTimers::shutdown`]
//! cancels what is pending and emits the 0 values immediately, so nothing
//! is emitted for the device once the supervisor task has ended.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use vto_core::{DeviceId, Field, Notification};

use super::Notifier;

/// Generation counter per field. A timer only reverts if no newer raise
/// happened since it was scheduled; holding the lock while emitting keeps
/// a raise and a stale revert from interleaving.
type Generations = Arc<Mutex<HashMap<Field, u64>>>;

/// Pending revert timers for one device.
pub struct RevertTimers {
    device_id: DeviceId,
    notifier: Arc<dyn Notifier>,
    generations: Generations,
    timers: HashMap<Field, JoinHandle<()>>,
}

impl RevertTimers {
    pub fn new(device_id: DeviceId, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            device_id,
            notifier,
            generations: Arc::new(Mutex::new(HashMap::new())),
            timers: HashMap::new(),
        }
    }

    /// Emits `field = 1` and (re)schedules `field = 0`.
    pub async fn raise(&mut self, field: Field) {
        let generation = {
            let mut generations = self.generations.lock().await;
            let generation = generations.entry(field).or_insert(0);
            *generation += 1;

            if let Some(previous) = self.timers.remove(&field) {
                previous.abort();
            }
            self.notifier
                .notify(Notification::raised(self.device_id.clone(), field));
            *generation
        };

        let timer = tokio::spawn(revert_after_delay(
            Arc::clone(&self.generations),
            Arc::clone(&self.notifier),
            self.device_id.clone(),
            field,
            generation,
        ));
        self.timers.insert(field, timer);
    }

    /// Number of reverts still waiting to fire.
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|t| !t.is_finished()).count()
    }

    /// Cancels pending reverts, emitting their 0 values now.
    pub async fn shutdown(&mut self) {
        let mut generations = self.generations.lock().await;

        for (field, timer) in self.timers.drain() {
            *generations.entry(field).or_insert(0) += 1;
            timer.abort();

            match timer.await {
                Err(e) if e.is_cancelled() => {
                    debug!(device_id = %self.device_id, field = %field, "Reverting early on shutdown");
                    self.notifier
                        .notify(Notification::cleared(self.device_id.clone(), field));
                }
                // Already reverted
                _ => {}
            }
        }
    }
}

impl Drop for RevertTimers {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.abort();
        }
    }
}

async fn revert_after_delay(
    generations: Generations,
    notifier: Arc<dyn Notifier>,
    device_id: DeviceId,
    field: Field,
    generation: u64,
) {
    sleep(field.revert_after()).await;

    let current = generations.lock().await;
    if current.get(&field) == Some(&generation) {
        debug!(device_id = %device_id, field = %field, "Reverting flag");
        notifier.notify(Notification::cleared(device_id, field));
    }
}
