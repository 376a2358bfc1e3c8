//! Events yielded by a device session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A structured event received from a device.
///
/// Only `action` and `code` carry meaning for the daemon; everything else
/// the device sends is kept in `payload` for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    /// Event phase, e.g. `Start`, `Stop`, `Pulse`
    pub action: String,

    /// Event kind, e.g. `CallNoAnswered`, `AccessControl`
    pub code: String,

    /// Remaining event fields, untouched
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

impl ProtocolEvent {
    /// Creates an event with an empty payload.
    pub fn new(action: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            code: code.into(),
            payload: Map::new(),
        }
    }

    /// Attaches payload fields.
    #[must_use]
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Returns true if this event has the given action and code.
    pub fn is(&self, action: &str, code: &str) -> bool {
        self.action == action && self.code == code
    }
}
