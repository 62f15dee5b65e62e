//! A bank of logical key/value databases durable through a hybrid
//! snapshot + command-log file.
//!
//! [Manager] owns the databases, dispatches request frames to them, and runs
//! the durability state machine. Mutating frames are recorded (exactly as
//! received) into an in-memory command log; once per second the housekeeping
//! task asks [Manager::writable] whether a flush is due. A flush either
//! appends the drained command log to the persistence blob or, when the
//! snapshot policy fires, truncates the blob and rewrites it with a full
//! serialization of every database.
//!
//! # Format
//!
//! All scalars are little-endian. The blob begins with a snapshot and is
//! extended with length-prefixed command frames until the next rollover:
//!
//! ```text
//! +----------------+------------------------------------+-----+
//! | Count (u64)    | Id (u64) | Size (u64) | Body       | ... |  snapshot
//! +----------------+------------------------------------+-----+
//! | Size (u64) | Frame  | Size (u64) | Frame  | ...           |  command log
//! +---------------------------------------------------------- +
//! ```
//!
//! A database body is `u64` entry count followed by `key length || key ||
//! value` entries; see [Value] for the value encoding.
//!
//! # Recovery
//!
//! On init the manager creates databases 0..15, loads the snapshot (replacing
//! or adding databases), and replays each trailing frame through
//! [Manager::query]. A short read anywhere in the blob is [Error::Corrupt]
//! and startup fails rather than silently dropping data.
//!
//! # Example
//!
//! ```rust
//! use commonware_runtime::{deterministic, Runner};
//! use keybank::{command, Command, Config, Manager};
//!
//! let executor = deterministic::Runner::default();
//! executor.start(|context| async move {
//!     // Open a store
//!     let manager = Manager::init(context, Config {
//!         partition: "store".to_string(),
//!     }).await.unwrap();
//!
//!     // Write a key to database 0
//!     let frame = command::frame(Command::Set, 0, b"greeting hello");
//!     let response = manager.query(&frame).await.unwrap();
//!     assert_eq!(response, b"OK");
//!
//!     // Read it back
//!     let frame = command::frame(Command::Get, 0, b"greeting");
//!     let response = manager.query(&frame).await.unwrap();
//!     assert_eq!(response, b"hello");
//! });
//! ```

mod database;
mod manager;

pub use database::{Database, Value};
pub use manager::Manager;

use thiserror::Error as ThisError;

/// Errors that can occur when interacting with the store.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("runtime error: {0}")]
    Runtime(#[from] commonware_runtime::Error),
    #[error("corrupt log: {0}")]
    Corrupt(&'static str),
    #[error("unknown command: {0}")]
    UnknownCommand(u8),
    #[error("malformed frame")]
    MalformedFrame,
    #[error("no such database: {0}")]
    NoSuchDatabase(u64),
}

impl Error {
    /// Whether the error is the offending client's fault (and should be
    /// returned to it as a response) rather than a fault of the store.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::UnknownCommand(_) | Error::MalformedFrame | Error::NoSuchDatabase(_)
        )
    }
}

/// Configuration for [Manager] storage.
#[derive(Clone)]
pub struct Config {
    /// The `commonware_runtime::Storage` partition to use for storing the
    /// snapshot + command-log blob.
    pub partition: String,
}
