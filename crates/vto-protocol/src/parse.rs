//! Frames exchanged with a device event service.
//!
//! Frames are newline-delimited JSON objects. The session opens with a
//! [`LoginFrame`]; every frame after that is a device event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vto_core::ProtocolEvent;

use crate::message::MessageError;

/// Raw event frame as sent by the device.
///
/// Devices capitalize `Action` and `Code`; lowercase keys are accepted too.
/// Every other key is kept verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDeviceEvent {
    #[serde(rename = "Action", alias = "action")]
    pub action: String,

    #[serde(rename = "Code", alias = "code")]
    pub code: String,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl RawDeviceEvent {
    /// Converts to the domain event.
    pub fn into_event(self) -> ProtocolEvent {
        ProtocolEvent::new(self.action, self.code).with_payload(self.rest)
    }
}

/// First frame of a session, carrying the device credentials.
#[derive(Debug, Clone, Serialize)]
pub struct LoginFrame<'a> {
    pub method: &'static str,
    pub username: &'a str,
    pub password: &'a str,
}

impl<'a> LoginFrame<'a> {
    pub fn new(username: &'a str, password: &'a str) -> Self {
        Self {
            method: "login",
            username,
            password,
        }
    }
}

/// Parses one event frame.
///
/// # Errors
///
/// `MessageError::Empty` for a blank line and `MessageError::Decode` when
/// the frame is not an event object.
pub fn parse_event_frame(line: &str) -> Result<ProtocolEvent, MessageError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(MessageError::Empty);
    }
    let raw: RawDeviceEvent =
        serde_json::from_str(line).map_err(|e| MessageError::Decode(e.to_string()))?;
    Ok(raw.into_event())
}
