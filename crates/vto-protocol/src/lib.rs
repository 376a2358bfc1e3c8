//! VTO Protocol - Wire formats for the VTO daemon
//!
//! This crate provides the message types exchanged on the local control
//! channel (controller → daemon) and the parser for event frames read
//! from a device session.

pub mod message;
pub mod parse;

pub use message::{Command, ControlMessage, MessageError};
pub use parse::{parse_event_frame, LoginFrame, RawDeviceEvent};
