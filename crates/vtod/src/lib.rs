//! VTO Daemon - Device supervisors, registry and control channel
//!
//! This crate provides the core infrastructure for the VTO daemon:
//! - `supervisor` - One reconnect loop per device, with fixed backoff
//! - `registry` - Registry actor owning the device id → supervisor mapping
//! - `server` - TCP control transport feeding the command queue
//! - `control` - Authenticated dispatch of control commands
//! - `session` - Device session client contract and TCP event client
//! - `notify` - Notification sinks and self-reverting flag timers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        vtod daemon                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ ControlServer   │────▶│     ControlChannel          │   │
//! │  │ (TCP socket)    │ mpsc│  (auth + dispatch)          │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │ RegistryHandle    │
//! │                                         ▼                   │
//! │                          ┌─────────────────────────────┐   │
//! │                          │     RegistryActor           │   │
//! │                          │  (device id → supervisor)   │   │
//! │                          └──────────────┬──────────────┘   │
//! │                                         │ spawn / stop      │
//! │                                         ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ SessionClient   │◀───▶│   Supervisor (per device)   │   │
//! │  │ (device events) │     │   EventHandler + reverts    │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │ Notification      │
//! │                                         ▼                   │
//! │                          ┌─────────────────────────────┐   │
//! │                          │   Notifier (HTTP callback)  │   │
//! │                          └─────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod control;
pub mod logging;
pub mod notify;
pub mod pidfile;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod supervisor;
