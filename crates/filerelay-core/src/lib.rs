//! # filerelay – core
//!
//! Infrastructure shared by the transfer crates:
//!   • A bounded, thread-safe operation log for per-run trace messages
//!   • Address resolution and TCP connect helpers with operator-facing hints

pub mod net;
pub mod oplog;

pub use net::{connect_tcp, resolve_first};
pub use oplog::{LogEntry, OperationLog, DEFAULT_LOG_CAPACITY};
