//! A single-node, multi-database key/value store durable through full
//! snapshots and an append-only command log.
//!
//! Clients connect over TCP, select one of a bank of logical databases by
//! numeric id, and issue string, hash, and list commands. Every mutating
//! command is recorded (as the exact frame received) into an in-memory
//! command log; a housekeeping task periodically flushes that log to the end
//! of a single persistence file and, on a schedule derived from elapsed time
//! and mutation volume, rewrites the file with a fresh snapshot of every
//! database. Restart recovers by loading the snapshot and replaying the
//! trailing log.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                      TCP Clients                       │
//! └──────────────────────────┬─────────────────────────────┘
//!                            │ frame = command | db id | statement
//! ┌──────────────────────────▼─────────────────────────────┐
//! │                    store::Manager                      │
//! │   dispatch ──► Database (0..15, more via SELECT)       │
//! │   record  ──► command log buffer                       │
//! └──────────────────────────┬─────────────────────────────┘
//!                            │ writable / truncate / write / wrote
//! ┌──────────────────────────▼─────────────────────────────┐
//! │            dump.aof  (snapshot ++ command log)         │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The `server` binary wires the manager to a listener and spawns the
//! housekeeping task; the `client` binary is a line-oriented REPL speaking
//! the same frames.

pub mod command;
pub mod store;

pub use command::Command;
pub use store::{Config, Database, Error, Manager, Value};

/// Maximum size of a request or response frame on the wire.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default port the server listens on.
pub const DEFAULT_PORT: u16 = 9090;

/// Returns the version of the crate.
pub fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
