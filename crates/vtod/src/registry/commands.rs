//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for subscribers

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use vto_core::{Device, DeviceId};

use crate::supervisor::{ConnectionState, SupervisorHandle};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Start supervising a device, replacing any supervisor with the same id.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if a new id would exceed capacity
    Add {
        /// The device to supervise (boxed to keep the enum small)
        device: Box<Device>,
        respond_to: oneshot::Sender<Result<AddOutcome, RegistryError>>,
    },

    /// Stop and forget a device. Responds `false` if it was not registered.
    Remove {
        device_id: DeviceId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Stop every supervisor. Responds with how many were stopped.
    StopAll { respond_to: oneshot::Sender<usize> },

    /// Get all devices as views, ordered by id.
    List {
        respond_to: oneshot::Sender<Vec<DeviceView>>,
    },

    /// Get one device by id.
    Get {
        device_id: DeviceId,
        respond_to: oneshot::Sender<Option<DeviceView>>,
    },
}

/// Result of a successful add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The id was not registered before.
    Added,
    /// A previous supervisor for the id was stopped first.
    Replaced,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry has reached its maximum device capacity.
    #[error("registry is full (max: {max} devices)")]
    RegistryFull { max: usize },

    /// The actor is gone.
    #[error("registry channel closed")]
    ChannelClosed,
}

// ============================================================================
// Registry Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A supervisor was started.
    Added { device_id: DeviceId, replaced: bool },
    /// A supervisor was stopped by an explicit remove.
    Removed { device_id: DeviceId },
    /// Every supervisor was stopped.
    StoppedAll { count: usize },
}

// ============================================================================
// Device View
// ============================================================================

/// Read-only view of a supervised device. Never carries credentials.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub id: DeviceId,
    pub host: String,
    pub port: u16,
    /// Label of the current connection state
    pub state: &'static str,
    #[serde(skip)]
    pub connection: ConnectionState,
    pub since: DateTime<Utc>,
    pub attempts: u64,
}

impl DeviceView {
    /// Builds a view from a live supervisor.
    pub fn from_handle(handle: &SupervisorHandle) -> Self {
        let device = handle.device();
        let snapshot = handle.state();
        Self {
            id: device.id.clone(),
            host: device.host.clone(),
            port: device.port,
            state: snapshot.state.label(),
            connection: snapshot.state,
            since: snapshot.since,
            attempts: snapshot.attempts,
        }
    }
}
