//! VTO Core - Shared domain types for the VTO supervision daemon
//!
//! This crate provides the types shared between the control protocol
//! (vto-protocol) and the daemon (vtod): devices, the events a device
//! session yields, and the notifications derived from them.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod device;
pub mod error;
pub mod event;
pub mod notification;

// Re-exports for convenience
pub use device::{Device, DeviceId, DEFAULT_DEVICE_PORT};
pub use error::{DomainError, DomainResult};
pub use event::ProtocolEvent;
pub use notification::{Field, Notification};
