//! Registry actor - single owner of all device supervisors.
//!
//! Commands are processed one at a time, so two adds for the same id can
//! never race: the second waits until the first supervisor has fully
//! stopped before its replacement starts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use vto_core::{Device, DeviceId};

use super::commands::{AddOutcome, DeviceView, RegistryCommand, RegistryError, RegistryEvent};
use crate::notify::Notifier;
use crate::session::SessionClient;
use crate::supervisor::{BackoffPolicy, Supervisor, SupervisorHandle};

/// Maximum number of supervised devices.
pub const MAX_DEVICES: usize = 256;

/// How long a stopping supervisor may take before its task is aborted.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// The registry actor.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Live supervisors by device id
    supervisors: BTreeMap<DeviceId, SupervisorHandle>,

    client: Arc<dyn SessionClient>,
    notifier: Arc<dyn Notifier>,
    policy: BackoffPolicy,

    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing events
    /// * `client` - Session client handed to every supervisor
    /// * `notifier` - Notification sink shared by every supervisor
    /// * `policy` - Reconnect delays for every supervisor
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
        client: Arc<dyn SessionClient>,
        notifier: Arc<dyn Notifier>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            receiver,
            supervisors: BTreeMap::new(),
            client,
            notifier,
            policy,
            event_publisher,
        }
    }

    /// Runs the actor event loop until every handle is dropped.
    ///
    /// Supervisors still registered at that point are stopped.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        let remaining = self.stop_all().await;
        info!(stopped = remaining, "Registry actor stopped");
    }

    async fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Add { device, respond_to } => {
                let result = self.handle_add(*device).await;
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove {
                device_id,
                respond_to,
            } => {
                let removed = self.handle_remove(&device_id).await;
                let _ = respond_to.send(removed);
            }
            RegistryCommand::StopAll { respond_to } => {
                let count = self.stop_all().await;
                let _ = self.event_publisher.send(RegistryEvent::StoppedAll { count });
                let _ = respond_to.send(count);
            }
            RegistryCommand::List { respond_to } => {
                let views = self.supervisors.values().map(DeviceView::from_handle).collect();
                let _ = respond_to.send(views);
            }
            RegistryCommand::Get {
                device_id,
                respond_to,
            } => {
                let view = self.supervisors.get(&device_id).map(DeviceView::from_handle);
                let _ = respond_to.send(view);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    async fn handle_add(&mut self, device: Device) -> Result<AddOutcome, RegistryError> {
        let device_id = device.id.clone();

        let outcome = match self.supervisors.remove(&device_id) {
            Some(previous) => {
                info!(device_id = %device_id, "Replacing existing supervisor");
                previous.shutdown(STOP_GRACE).await;
                AddOutcome::Replaced
            }
            None if self.supervisors.len() >= MAX_DEVICES => {
                warn!(device_id = %device_id, max = MAX_DEVICES, "Registry full, device rejected");
                return Err(RegistryError::RegistryFull { max: MAX_DEVICES });
            }
            None => AddOutcome::Added,
        };

        let handle = Supervisor::spawn(
            Arc::new(device),
            Arc::clone(&self.client),
            Arc::clone(&self.notifier),
            self.policy,
        );
        self.supervisors.insert(device_id.clone(), handle);

        info!(device_id = %device_id, total = self.supervisors.len(), "Device added");
        let _ = self.event_publisher.send(RegistryEvent::Added {
            device_id,
            replaced: outcome == AddOutcome::Replaced,
        });

        Ok(outcome)
    }

    async fn handle_remove(&mut self, device_id: &DeviceId) -> bool {
        match self.supervisors.remove(device_id) {
            Some(handle) => {
                handle.shutdown(STOP_GRACE).await;
                info!(device_id = %device_id, total = self.supervisors.len(), "Device removed");
                let _ = self.event_publisher.send(RegistryEvent::Removed {
                    device_id: device_id.clone(),
                });
                true
            }
            None => {
                debug!(device_id = %device_id, "Remove ignored, device not registered");
                false
            }
        }
    }

    /// Signals every supervisor first, then waits for each.
    async fn stop_all(&mut self) -> usize {
        let supervisors = std::mem::take(&mut self.supervisors);
        let count = supervisors.len();

        for handle in supervisors.values() {
            handle.stop();
        }
        for handle in supervisors.into_values() {
            handle.shutdown(STOP_GRACE).await;
        }

        if count > 0 {
            info!(count, "All supervisors stopped");
        }
        count
    }

    /// Returns the number of supervised devices.
    pub fn device_count(&self) -> usize {
        self.supervisors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;
    use crate::session::{Connection, SessionError};
    use async_trait::async_trait;
    use tokio::sync::oneshot;

    /// Client whose connections never produce anything.
    struct IdleClient;

    struct IdleConnection;

    #[async_trait]
    impl SessionClient for IdleClient {
        async fn open(&self, _device: &Device) -> Result<Box<dyn Connection>, SessionError> {
            Ok(Box::new(IdleConnection))
        }
    }

    #[async_trait]
    impl Connection for IdleConnection {
        async fn next_event(
            &mut self,
        ) -> Result<Option<vto_core::ProtocolEvent>, SessionError> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    fn create_actor() -> (
        mpsc::Sender<RegistryCommand>,
        RegistryActor,
        broadcast::Receiver<RegistryEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        let actor = RegistryActor::new(
            cmd_rx,
            event_tx,
            Arc::new(IdleClient),
            Arc::new(MemoryNotifier::new()),
            BackoffPolicy::default(),
        );
        (cmd_tx, actor, event_rx)
    }

    fn test_device(id: &str) -> Device {
        Device::new(id, "192.0.2.10", "admin", "secret")
    }

    async fn add(actor: &mut RegistryActor, id: &str) -> Result<AddOutcome, RegistryError> {
        let (tx, rx) = oneshot::channel();
        actor
            .handle_command(RegistryCommand::Add {
                device: Box::new(test_device(id)),
                respond_to: tx,
            })
            .await;
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_add_device() {
        let (cmd_tx, mut actor, mut event_rx) = create_actor();

        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(RegistryCommand::Add {
                device: Box::new(test_device("1")),
                respond_to: tx,
            })
            .await
            .unwrap();

        // Process the command manually (actor not running in background)
        if let Some(cmd) = actor.receiver.recv().await {
            actor.handle_command(cmd).await;
        }

        assert_eq!(rx.await.unwrap(), Ok(AddOutcome::Added));
        assert_eq!(actor.device_count(), 1);

        let event = event_rx.try_recv().unwrap();
        assert_eq!(
            event,
            RegistryEvent::Added {
                device_id: DeviceId::new("1"),
                replaced: false
            }
        );
        actor.stop_all().await;
    }

    #[tokio::test]
    async fn test_add_same_id_replaces() {
        let (_, mut actor, mut event_rx) = create_actor();

        assert_eq!(add(&mut actor, "1").await, Ok(AddOutcome::Added));
        assert_eq!(add(&mut actor, "1").await, Ok(AddOutcome::Replaced));
        assert_eq!(actor.device_count(), 1);

        let _ = event_rx.try_recv().unwrap();
        let event = event_rx.try_recv().unwrap();
        assert!(matches!(event, RegistryEvent::Added { replaced: true, .. }));
        actor.stop_all().await;
    }

    #[tokio::test]
    async fn test_remove_device() {
        let (_, mut actor, _) = create_actor();
        add(&mut actor, "1").await.unwrap();

        let (tx, rx) = oneshot::channel();
        actor
            .handle_command(RegistryCommand::Remove {
                device_id: DeviceId::new("1"),
                respond_to: tx,
            })
            .await;

        assert!(rx.await.unwrap());
        assert_eq!(actor.device_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_nonexistent_is_noop() {
        let (_, mut actor, mut event_rx) = create_actor();

        let (tx, rx) = oneshot::channel();
        actor
            .handle_command(RegistryCommand::Remove {
                device_id: DeviceId::new("missing"),
                respond_to: tx,
            })
            .await;

        assert!(!rx.await.unwrap());
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_all() {
        let (_, mut actor, mut event_rx) = create_actor();
        add(&mut actor, "1").await.unwrap();
        add(&mut actor, "2").await.unwrap();
        add(&mut actor, "3").await.unwrap();

        let (tx, rx) = oneshot::channel();
        actor
            .handle_command(RegistryCommand::StopAll { respond_to: tx })
            .await;

        assert_eq!(rx.await.unwrap(), 3);
        assert_eq!(actor.device_count(), 0);

        let mut last = None;
        while let Ok(event) = event_rx.try_recv() {
            last = Some(event);
        }
        assert_eq!(last, Some(RegistryEvent::StoppedAll { count: 3 }));
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_redacted() {
        let (_, mut actor, _) = create_actor();
        add(&mut actor, "b").await.unwrap();
        add(&mut actor, "a").await.unwrap();

        let (tx, rx) = oneshot::channel();
        actor
            .handle_command(RegistryCommand::List { respond_to: tx })
            .await;
        let views = rx.await.unwrap();

        let ids: Vec<_> = views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let json = serde_json::to_string(&views).unwrap();
        assert!(!json.contains("secret"));
        actor.stop_all().await;
    }

    #[tokio::test]
    async fn test_max_devices_limit() {
        let (_, mut actor, _) = create_actor();

        for i in 0..MAX_DEVICES {
            add(&mut actor, &i.to_string()).await.unwrap();
        }

        let result = add(&mut actor, "one-too-many").await;
        assert_eq!(result, Err(RegistryError::RegistryFull { max: MAX_DEVICES }));

        // Replacing an existing id is still allowed when full
        assert_eq!(add(&mut actor, "0").await, Ok(AddOutcome::Replaced));
        assert_eq!(actor.device_count(), MAX_DEVICES);
        actor.stop_all().await;
    }
}
