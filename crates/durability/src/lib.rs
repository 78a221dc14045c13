//! Durability layer for the transaction coordinator
//!
//! The coordinator of a two-phase commit must remember what it decided:
//! a participant that voted `Prepared` holds locks until it hears the
//! decision. This crate implements that memory:
//! - [`LogRecord`]: Begin, Commit, Abort, End
//! - Record encoding with CRC32 checksums
//! - [`DurabilityMode`]: None, Buffered, Strict
//! - [`DecisionLog`]: append-only file, replay on open, pending list
//!
//! Recovery follows presumed abort: a transaction with a `Begin` record
//! but no decision is aborted.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod log;
pub mod mode;
pub mod record;

pub use encoding::{decode_record, encode_record, RECORD_HEADER_SIZE};
pub use log::{DecisionLog, LogError, PendingTxn};
pub use mode::DurabilityMode;
pub use record::{Decision, LogRecord};
