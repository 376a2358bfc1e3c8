//! Control channel message types.
//!
//! One JSON object per message:
//!
//! ```text
//! { "apikey": "...", "cmd": "add" | "remove" | "stop", "device": { ... } }
//! ```
//!
//! Decoding happens in stages so each failure has its own error: the raw
//! JSON is decoded into a [`ControlMessage`], the shared secret is checked,
//! and only then is the message turned into a typed [`Command`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use vto_core::{Device, DeviceId};

/// A decoded but not yet validated control message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Shared secret presented by the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apikey: Option<String>,

    /// Command name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    /// Command argument, kept raw until the command is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Value>,
}

/// A validated control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start supervising a device, replacing any device with the same id.
    Add(Device),

    /// Stop supervising a device.
    Remove(DeviceId),

    /// Stop every supervisor and shut the daemon down.
    Stop,
}

impl Command {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Remove(_) => "remove",
            Self::Stop => "stop",
        }
    }
}

impl ControlMessage {
    /// Decodes one message from a line of text.
    ///
    /// # Errors
    ///
    /// `MessageError::Empty` for a blank line, `MessageError::Decode` when
    /// the text is not a JSON object.
    pub fn decode(line: &str) -> Result<Self, MessageError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(MessageError::Empty);
        }
        serde_json::from_str(line).map_err(|e| MessageError::Decode(e.to_string()))
    }

    /// Encodes the message as a single line of JSON (without newline).
    ///
    /// # Errors
    ///
    /// `MessageError::Decode` if serialization fails.
    pub fn encode(&self) -> Result<String, MessageError> {
        serde_json::to_string(self).map_err(|e| MessageError::Decode(e.to_string()))
    }

    /// Creates an `add` message.
    pub fn add(apikey: impl Into<String>, device: &Device) -> Self {
        Self {
            apikey: Some(apikey.into()),
            cmd: Some("add".to_string()),
            device: serde_json::to_value(device).ok(),
        }
    }

    /// Creates a `remove` message.
    pub fn remove(apikey: impl Into<String>, device_id: &DeviceId) -> Self {
        Self {
            apikey: Some(apikey.into()),
            cmd: Some("remove".to_string()),
            device: Some(serde_json::json!({ "id": device_id })),
        }
    }

    /// Creates a `stop` message.
    pub fn stop(apikey: impl Into<String>) -> Self {
        Self {
            apikey: Some(apikey.into()),
            cmd: Some("stop".to_string()),
            device: None,
        }
    }

    /// Checks the presented apikey against the configured secret.
    ///
    /// A message without an apikey is never authorized.
    ///
    /// # Errors
    ///
    /// `MessageError::Unauthorized` on mismatch.
    pub fn authenticate(&self, secret: &str) -> Result<(), MessageError> {
        match self.apikey.as_deref() {
            Some(key) if key == secret => Ok(()),
            _ => Err(MessageError::Unauthorized),
        }
    }

    /// Returns the command name, if present.
    pub fn cmd(&self) -> Option<&str> {
        self.cmd.as_deref()
    }

    /// Converts the message into a typed command.
    ///
    /// Does not check the apikey; call [`ControlMessage::authenticate`] first.
    ///
    /// # Errors
    ///
    /// - `MessageError::MissingCommand` / `UnknownCommand` for a bad `cmd`
    /// - `MessageError::MissingDevice` / `MissingDeviceId` when `add` or
    ///   `remove` has nothing to act on
    /// - `MessageError::InvalidDevice` when the payload does not describe
    ///   a usable device
    pub fn command(&self) -> Result<Command, MessageError> {
        let cmd = self.cmd.as_deref().ok_or(MessageError::MissingCommand)?;
        match cmd {
            "add" => {
                let payload = self.device_payload()?;
                let device: Device = serde_json::from_value(payload.clone())
                    .map_err(|e| MessageError::InvalidDevice(e.to_string()))?;
                device
                    .validate()
                    .map_err(|e| MessageError::InvalidDevice(e.to_string()))?;
                Ok(Command::Add(device))
            }
            "remove" => {
                let payload = self.device_payload()?;
                let id = payload.get("id").cloned().ok_or(MessageError::MissingDeviceId)?;
                let id: DeviceId = serde_json::from_value(id)
                    .map_err(|e| MessageError::InvalidDevice(e.to_string()))?;
                Ok(Command::Remove(id))
            }
            "stop" => Ok(Command::Stop),
            other => Err(MessageError::UnknownCommand(other.to_string())),
        }
    }

    /// Returns the device object, requiring it to carry an `id`.
    fn device_payload(&self) -> Result<&Value, MessageError> {
        let payload = self.device.as_ref().ok_or(MessageError::MissingDevice)?;
        if !payload.is_object() {
            return Err(MessageError::InvalidDevice(
                "device must be a JSON object".to_string(),
            ));
        }
        match payload.get("id") {
            Some(Value::Null) | None => Err(MessageError::MissingDeviceId),
            Some(_) => Ok(payload),
        }
    }
}

/// Reasons a control message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("empty message")]
    Empty,

    #[error("malformed message: {0}")]
    Decode(String),

    #[error("invalid apikey")]
    Unauthorized,

    #[error("message has no cmd")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("command requires a device")]
    MissingDevice,

    #[error("device has no id")]
    MissingDeviceId,

    #[error("invalid device: {0}")]
    InvalidDevice(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "s3cret";

    #[test]
    fn test_decode_add() {
        let msg = ControlMessage::decode(
            r#"{"apikey":"s3cret","cmd":"add","device":{"id":12,"host":"10.0.0.9","username":"admin","password":"pw"}}"#,
        )
        .unwrap();
        assert!(msg.authenticate(KEY).is_ok());

        match msg.command().unwrap() {
            Command::Add(device) => {
                assert_eq!(device.id.as_str(), "12");
                assert_eq!(device.host, "10.0.0.9");
                assert_eq!(device.password, "pw");
            }
            other => panic!("Expected Add, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_remove_uses_only_id() {
        let msg = ControlMessage::decode(
            r#"{"apikey":"s3cret","cmd":"remove","device":{"id":"front","host":"ignored"}}"#,
        )
        .unwrap();
        assert_eq!(msg.command().unwrap(), Command::Remove(DeviceId::new("front")));
    }

    #[test]
    fn test_decode_stop_without_device() {
        let msg = ControlMessage::decode(r#"{"apikey":"s3cret","cmd":"stop"}"#).unwrap();
        assert_eq!(msg.command().unwrap(), Command::Stop);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ControlMessage::decode("{not json"),
            Err(MessageError::Decode(_))
        ));
        assert_eq!(ControlMessage::decode("   \n"), Err(MessageError::Empty));
        assert!(matches!(
            ControlMessage::decode("[1,2,3]"),
            Err(MessageError::Decode(_))
        ));
    }

    #[test]
    fn test_authenticate() {
        let msg = ControlMessage::stop("wrong");
        assert_eq!(msg.authenticate(KEY), Err(MessageError::Unauthorized));

        let anonymous = ControlMessage {
            cmd: Some("stop".to_string()),
            ..Default::default()
        };
        assert_eq!(anonymous.authenticate(""), Err(MessageError::Unauthorized));
    }

    #[test]
    fn test_command_errors() {
        let unknown = ControlMessage::decode(r#"{"apikey":"k","cmd":"reboot"}"#).unwrap();
        assert_eq!(
            unknown.command(),
            Err(MessageError::UnknownCommand("reboot".to_string()))
        );

        let no_cmd = ControlMessage::decode(r#"{"apikey":"k"}"#).unwrap();
        assert_eq!(no_cmd.command(), Err(MessageError::MissingCommand));

        let no_device = ControlMessage::decode(r#"{"apikey":"k","cmd":"add"}"#).unwrap();
        assert_eq!(no_device.command(), Err(MessageError::MissingDevice));

        let no_id =
            ControlMessage::decode(r#"{"apikey":"k","cmd":"add","device":{"host":"h"}}"#).unwrap();
        assert_eq!(no_id.command(), Err(MessageError::MissingDeviceId));

        let no_host =
            ControlMessage::decode(r#"{"apikey":"k","cmd":"add","device":{"id":1}}"#).unwrap();
        assert!(matches!(no_host.command(), Err(MessageError::InvalidDevice(_))));

        let bad_id =
            ControlMessage::decode(r#"{"apikey":"k","cmd":"remove","device":{"id":[1]}}"#).unwrap();
        assert!(matches!(bad_id.command(), Err(MessageError::InvalidDevice(_))));
    }

    #[test]
    fn test_builders_encode_expected_shape() {
        let device = Device::new("5", "vto.lan", "admin", "pw");
        let json = ControlMessage::add(KEY, &device).encode().unwrap();
        assert!(json.contains("\"cmd\":\"add\""));
        assert!(json.contains("\"host\":\"vto.lan\""));

        let stop = ControlMessage::stop(KEY).encode().unwrap();
        assert!(!stop.contains("device"));

        let remove = ControlMessage::remove(KEY, &DeviceId::new("5"));
        assert_eq!(remove.command().unwrap(), Command::Remove(DeviceId::new("5")));
    }
}
