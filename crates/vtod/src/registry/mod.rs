//! Device registry using the Actor pattern.
//!
//! The registry owns every device supervisor. It receives commands via a
//! tokio mpsc channel, so at most one supervisor per device id is ever
//! live, and a replacement only starts after its predecessor stopped.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Control Channel │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   RegistryEvent       │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!   add/remove/stop        BTreeMap<DeviceId,       Subscribers
//!                          SupervisorHandle>
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::notify::Notifier;
use crate::session::SessionClient;
use crate::supervisor::BackoffPolicy;

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, MAX_DEVICES, STOP_GRACE};
pub use commands::{AddOutcome, DeviceView, RegistryCommand, RegistryError, RegistryEvent};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawns the registry actor and returns a handle for interaction.
///
/// The actor stops every supervisor and exits once all handles are dropped.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use vtod::notify::LogNotifier;
/// use vtod::registry::spawn_registry;
/// use vtod::session::TcpEventClient;
/// use vtod::supervisor::BackoffPolicy;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(
///         Arc::new(TcpEventClient::default()),
///         Arc::new(LogNotifier),
///         BackoffPolicy::default(),
///     );
///     let devices = handle.list().await;
/// }
/// ```
pub fn spawn_registry(
    client: Arc<dyn SessionClient>,
    notifier: Arc<dyn Notifier>,
    policy: BackoffPolicy,
) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), client, notifier, policy);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
