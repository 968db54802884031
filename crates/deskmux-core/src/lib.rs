//! deskmux-core: server runtime for multiplexing a headless terminal desktop
//! to remote clients over a length-prefixed binary protocol.
//!
//! # Architecture
//!
//! ```text
//! desktop engine  --refresh-->  sink  -->  publisher  -->  session queue
//!       ^                                                       |
//!       |                                                       v
//!  inject events  <--  sink  <--  connection read pump   connection write pump
//! ```
//!
//! # Modules
//!
//! - `ids`: `SessionId`, `PaneId`, `Sequence` newtypes.
//! - `codec`: wire frame header, message enum, encode/decode.
//! - `session`: per-client diff queue with ack-driven trimming.
//! - `manager`: session registry and ID minting.
//! - `model`: shared data types (`TreeCapture`, `BufferDelta`, `Style`, ...).
//! - `desktop`: the `DesktopEngine` trait consumed (not implemented) by the
//!   core, plus the data types it hands back (`TreeCapture`, `PaneSnapshot`, ...).
//! - `snapshot`: durable on-disk tree capture with content hashing.
//! - `publisher`: buffer diffing, style interning, per-pane dirty tracking.
//! - `scheduler`: per-pane debounce timer with fallback publish.
//! - `sink`: event-sink adapter routing client input into the desktop engine.
//! - `connection`: per-client protocol state machine.
//! - `config`: on-disk configuration (listener path, retention, logging).
//! - `logging`: structured logging setup.
//! - `error`: crate-wide error taxonomy.
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod connection;
pub mod desktop;
pub mod error;
pub mod ids;
pub mod logging;
pub mod manager;
pub mod model;
pub mod publisher;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod sink;
pub mod snapshot;

pub use error::{Error, Result};
pub use ids::{PaneId, SessionId, Sequence};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
