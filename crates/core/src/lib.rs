//! Core types for DTranx
//!
//! This crate defines the vocabulary shared by every other crate:
//! - [`Key`], [`Value`], [`Version`]: the data model of a partitioned store
//! - [`NodeAddr`], [`TxnId`]: identities of storage nodes and transactions
//! - [`NodeSession`]: the operations a client can issue against one node
//! - [`Error`]: infrastructure failures (I/O, timeouts, configuration)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{Error, Result};
pub use protocol::{
    Conflict, NodeSession, PrepareRequest, ReadCheck, ReadReply, SnapshotGap, Vote,
};
pub use types::{ClientId, Key, NodeAddr, TxnId, Value, Version};
