//! HTTP callback notifier.
//!
//! Relays device state changes to the controller's callback endpoint.
//! Changes are merged per device and POSTed as
//!
//! ```text
//! {"devices": {"<device id>": {"calling": 1, "unlocked": 0}}}
//! ```
//!
//! to `<callback>?apikey=<apikey>`, either as soon as they arrive (cycle
//! of zero) or once per cycle. A change that would overwrite a pending
//! value for the same field with a different value flushes the batch
//! first, so a short-lived raise is never merged away by its revert.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vto_core::{DeviceId, Notification};

use super::Notifier;

/// Timeout for each request to the backend.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tick used when batching is disabled (the ticker is never polled then).
const IDLE_TICK: Duration = Duration::from_secs(3600);

type PendingChanges = BTreeMap<DeviceId, BTreeMap<&'static str, u8>>;

/// Errors talking to the notification backend.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification flusher is not running")]
    FlusherStopped,
}

enum FlushRequest {
    Change(Notification),
    Flush(oneshot::Sender<()>),
}

#[derive(Serialize)]
struct ChangeSet<'a> {
    devices: &'a PendingChanges,
}

/// Notifier posting changes to the controller over HTTP.
///
/// Cheap to clone; all clones feed the same flusher task.
#[derive(Clone)]
pub struct CallbackNotifier {
    sender: mpsc::UnboundedSender<FlushRequest>,
    client: Client,
    endpoint: Url,
}

impl CallbackNotifier {
    /// Creates the notifier and spawns its flusher task.
    ///
    /// The flusher runs until `cancel` fires, then sends whatever is
    /// still queued and exits.
    ///
    /// # Errors
    ///
    /// `NotifyError::Http` if the HTTP client cannot be built.
    pub fn spawn(
        callback: Url,
        apikey: &str,
        cycle: Duration,
        cancel: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), NotifyError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let mut endpoint = callback;
        endpoint.query_pairs_mut().append_pair("apikey", apikey);

        let (sender, receiver) = mpsc::unbounded_channel();
        let flusher = Flusher {
            client: client.clone(),
            endpoint: endpoint.clone(),
            receiver,
            pending: BTreeMap::new(),
            cycle,
        };
        let task = tokio::spawn(flusher.run(cancel));

        Ok((
            Self {
                sender,
                client,
                endpoint,
            },
            task,
        ))
    }

    /// Checks that the backend is reachable and accepts our apikey.
    ///
    /// # Errors
    ///
    /// `NotifyError::Http` on network failure or a non-2xx answer.
    pub async fn test(&self) -> Result<(), NotifyError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("test", "1");

        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }

    /// Sends everything queued so far and waits for the attempt to finish.
    ///
    /// # Errors
    ///
    /// `NotifyError::FlusherStopped` if the flusher task already exited.
    pub async fn flush(&self) -> Result<(), NotifyError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(FlushRequest::Flush(tx))
            .map_err(|_| NotifyError::FlusherStopped)?;
        rx.await.map_err(|_| NotifyError::FlusherStopped)
    }
}

impl Notifier for CallbackNotifier {
    fn notify(&self, notification: Notification) {
        if self.sender.send(FlushRequest::Change(notification)).is_err() {
            debug!("Notification dropped, flusher stopped");
        }
    }
}

/// Background task owning the pending batch.
struct Flusher {
    client: Client,
    endpoint: Url,
    receiver: mpsc::UnboundedReceiver<FlushRequest>,
    pending: PendingChanges,
    cycle: Duration,
}

impl Flusher {
    async fn run(mut self, cancel: CancellationToken) {
        let batching = !self.cycle.is_zero();
        let mut ticker = interval(if batching { self.cycle } else { IDLE_TICK });
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                request = self.receiver.recv() => match request {
                    Some(request) => {
                        self.handle(request).await;
                        if !batching {
                            self.send_pending().await;
                        }
                    }
                    None => break,
                },

                _ = ticker.tick(), if batching => self.send_pending().await,
            }
        }

        // Final flush
        self.receiver.close();
        while let Ok(request) = self.receiver.try_recv() {
            self.handle(request).await;
        }
        self.send_pending().await;
        debug!("Notification flusher stopped");
    }

    async fn handle(&mut self, request: FlushRequest) {
        match request {
            FlushRequest::Change(notification) => self.merge(notification).await,
            FlushRequest::Flush(done) => {
                self.send_pending().await;
                let _ = done.send(());
            }
        }
    }

    async fn merge(&mut self, notification: Notification) {
        let key = notification.field.key();
        let conflicting = self
            .pending
            .get(&notification.device_id)
            .and_then(|fields| fields.get(key))
            .is_some_and(|value| *value != notification.value);

        if conflicting {
            self.send_pending().await;
        }

        self.pending
            .entry(notification.device_id)
            .or_default()
            .insert(key, notification.value);
    }

    async fn send_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let changes = std::mem::take(&mut self.pending);

        let result = self
            .client
            .post(self.endpoint.clone())
            .json(&ChangeSet { devices: &changes })
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => debug!(devices = changes.len(), "Changes sent to controller"),
            Err(e) => warn!(error = %e, devices = changes.len(), "Failed to send changes to controller"),
        }
    }
}
