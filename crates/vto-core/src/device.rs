//! Device identity and connection parameters.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DomainError, DomainResult};

/// Port the device session service listens on unless told otherwise.
pub const DEFAULT_DEVICE_PORT: u16 = 5000;

/// Identifier the controller assigns to a device.
///
/// Controllers send ids either as JSON strings or as integers; both are
/// normalized to their string form so `"12"` and `12` name the same device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new DeviceId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Ok(Self(s)),
            RawId::Number(n) => Ok(Self(n.to_string())),
        }
    }
}

/// A supervised device: where to connect and how to log in.
///
/// Immutable once built. Re-adding a device replaces it wholesale.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Controller-assigned identifier
    pub id: DeviceId,

    /// Hostname or IP address of the device
    pub host: String,

    /// Session service port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login name
    #[serde(default)]
    pub username: String,

    /// Login password
    #[serde(default)]
    pub password: String,
}

fn default_port() -> u16 {
    DEFAULT_DEVICE_PORT
}

impl Device {
    /// Creates a device on the default port.
    pub fn new(
        id: impl Into<DeviceId>,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port: DEFAULT_DEVICE_PORT,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Sets a custom session port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Checks that the device can be connected to.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::MissingField` for a blank id or host, and
    /// `DomainError::InvalidFieldValue` for port 0.
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.is_blank() {
            return Err(DomainError::missing("device.id"));
        }
        if self.host.trim().is_empty() {
            return Err(DomainError::missing("device.host"));
        }
        if self.port == 0 {
            return Err(DomainError::InvalidFieldValue {
                field: "device.port".to_string(),
                value: "0".to_string(),
                expected: "1-65535".to_string(),
            });
        }
        Ok(())
    }

    /// Returns `host:port` for socket connection.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// Credentials stay out of logs.
impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
