//! # DTranx
//!
//! Optimistic distributed transactions over a partitioned key-value store.
//!
//! A transaction reads through a [`ClientTranx`] coordinator, buffers its
//! writes locally, and commits with two-phase commit: each storage node
//! checks that the versions read are still current, the writes are applied
//! everywhere at one version, or nowhere.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dtranx::prelude::*;
//!
//! let config = ClientConfig::new().nodes(["10.0.0.1:60000", "10.0.0.2:60000"]);
//! let mut tranx = ClientTranx::new(config)?;
//!
//! let balance = tranx.read(&Key::from("acct:1"))?;
//! tranx.write(Key::from("acct:1"), Value::from(format!("{}!", balance)))?;
//! if !tranx.commit() {
//!     // Someone changed acct:1 since we read it; retry from the start
//! }
//! tranx.clear();
//! # Ok::<(), dtranx::Error>(())
//! ```
//!
//! ## Layers
//!
//! - [`DtranxDb`] - batched adapter returning [`Status`] codes
//! - [`ClientTranx`] - one transaction at a time: read, write, commit, clear
//! - `dtranx_concurrency` - transaction context, validation, 2PC manager
//! - `dtranx_wire` / `dtranx_storage` - TCP protocol and the storage node

#![warn(missing_docs)]

mod db;
mod error;

pub mod prelude;

pub use db::{Batch, BatchResult, DtranxDb, Status};
pub use error::{Error, Result};

pub use dtranx_client::{
    ClientConfig, ClientTranx, Connector, LocalConnector, PartitionLocator, SessionPool,
    TcpConnector,
};
pub use dtranx_concurrency::{
    CommitError, CommitOutcome, ManagerMetrics, ReadError, TransactionClosed, TransactionStatus,
};
pub use dtranx_core::{ClientId, Key, NodeAddr, NodeSession, TxnId, Value, Version};
pub use dtranx_durability::DurabilityMode;
pub use dtranx_storage::{NodeConfig, StorageNode};
pub use dtranx_wire::{NodeServer, ServerHandle, SessionOptions, TcpSession};
