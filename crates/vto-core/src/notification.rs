//! Notifications pushed to the controlling system.
//!
//! A notification is a transient assertion: a flag goes to 1 when the
//! device reports something, then reverts to 0 after a fixed delay.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::event::ProtocolEvent;

/// The device state flags the daemon reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Someone is ringing and nobody answered yet.
    Calling,

    /// The door lock was released.
    Unlocked,
}

impl Field {
    /// All fields, in reporting order.
    pub const ALL: [Field; 2] = [Field::Calling, Field::Unlocked];

    /// Maps a device event to the flag it raises, if any.
    ///
    /// `Start/CallNoAnswered` raises `calling` and `Pulse/AccessControl`
    /// raises `unlocked`. Every other event is informational.
    pub fn from_event(event: &ProtocolEvent) -> Option<Self> {
        if event.is("Start", "CallNoAnswered") {
            Some(Self::Calling)
        } else if event.is("Pulse", "AccessControl") {
            Some(Self::Unlocked)
        } else {
            None
        }
    }

    /// Key used for this field on the notification backend.
    pub fn key(self) -> &'static str {
        match self {
            Self::Calling => "calling",
            Self::Unlocked => "unlocked",
        }
    }

    /// How long the flag stays raised before it is reverted to 0.
    pub fn revert_after(self) -> Duration {
        match self {
            Self::Calling => Duration::from_secs(30),
            Self::Unlocked => Duration::from_secs(10),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One state change for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub device_id: DeviceId,
    pub field: Field,
    pub value: u8,
}

impl Notification {
    /// The flag is asserted (value 1).
    pub fn raised(device_id: DeviceId, field: Field) -> Self {
        Self {
            device_id,
            field,
            value: 1,
        }
    }

    /// The flag is reverted (value 0).
    pub fn cleared(device_id: DeviceId, field: Field) -> Self {
        Self {
            device_id,
            field,
            value: 0,
        }
    }

    /// Returns true for a raise.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.value != 0
    }
}
