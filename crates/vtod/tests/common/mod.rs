//! Shared helpers for vtod integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use vto_core::{Device, DeviceId, ProtocolEvent};
use vtod::session::{Connection, SessionClient, SessionError};
use vtod::supervisor::BackoffPolicy;

/// What the next `open` does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Connecting fails.
    Fail,
    /// Deliver the events, then the peer closes.
    CloseAfter(Vec<ProtocolEvent>),
    /// Deliver the events, then stay connected until closed.
    Hold(Vec<ProtocolEvent>),
    /// Deliver the events, then the session fails.
    FailAfter(Vec<ProtocolEvent>),
}

/// How a scripted session ends once its events are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Close,
    Hold,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Open,
    Close,
}

/// One recorded client call.
#[derive(Debug, Clone)]
pub struct Entry {
    pub op: Op,
    pub device: DeviceId,
    /// Host of the device, to tell replacements apart
    pub host: String,
    pub at: Instant,
}

pub type ClientLog = Arc<Mutex<Vec<Entry>>>;

/// Session client playing back scripts in order. Once the scripts run
/// out every connection holds with no events.
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    log: ClientLog,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<Script>) -> (Arc<Self>, ClientLog) {
        let log = ClientLog::default();
        let client = Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            log: Arc::clone(&log),
        });
        (client, log)
    }

    /// Client whose connections all hold forever.
    pub fn holding() -> (Arc<Self>, ClientLog) {
        Self::new(Vec::new())
    }
}

fn record(log: &ClientLog, op: Op, device: &Device) {
    log.lock().unwrap().push(Entry {
        op,
        device: device.id.clone(),
        host: device.host.clone(),
        at: Instant::now(),
    });
}

#[async_trait]
impl SessionClient for ScriptedClient {
    async fn open(&self, device: &Device) -> Result<Box<dyn Connection>, SessionError> {
        record(&self.log, Op::Open, device);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Hold(Vec::new()));

        let (events, ending) = match script {
            Script::Fail => {
                return Err(SessionError::Protocol("scripted failure".to_string()));
            }
            Script::CloseAfter(events) => (events, Ending::Close),
            Script::Hold(events) => (events, Ending::Hold),
            Script::FailAfter(events) => (events, Ending::Fail),
        };

        Ok(Box::new(ScriptedConnection {
            device: device.clone(),
            events: events.into(),
            ending,
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedConnection {
    device: Device,
    events: VecDeque<ProtocolEvent>,
    ending: Ending,
    log: ClientLog,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn next_event(&mut self) -> Result<Option<ProtocolEvent>, SessionError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        match self.ending {
            Ending::Close => Ok(None),
            Ending::Hold => std::future::pending().await,
            Ending::Fail => Err(SessionError::Protocol("scripted session error".to_string())),
        }
    }

    async fn close(&mut self) {
        record(&self.log, Op::Close, &self.device);
    }
}

/// Entries for one device and operation.
pub fn entries(log: &ClientLog, device: &str, op: Op) -> Vec<Entry> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|e| e.op == op && e.device.as_str() == device)
        .cloned()
        .collect()
}

/// Full log, in call order.
pub fn ops(log: &ClientLog) -> Vec<(Op, String, String)> {
    log.lock()
        .unwrap()
        .iter()
        .map(|e| (e.op, e.device.as_str().to_string(), e.host.clone()))
        .collect()
}

pub fn device(id: &str) -> Device {
    Device::new(id, "192.0.2.10", "admin", "secret")
}

pub fn call_event() -> ProtocolEvent {
    ProtocolEvent::new("Start", "CallNoAnswered")
}

pub fn unlock_event() -> ProtocolEvent {
    ProtocolEvent::new("Pulse", "AccessControl")
}

/// Short delays for tests running on the real clock.
pub fn fast_policy() -> BackoffPolicy {
    BackoffPolicy::new()
        .with_disconnect_delay(Duration::from_millis(20))
        .with_error_delay(Duration::from_millis(50))
}
