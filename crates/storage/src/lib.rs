//! Storage node for DTranx
//!
//! This crate implements the participant side of the transaction protocol:
//! - ShardedStore: DashMap of per-key version chains (bounded history)
//! - StorageNode: logical clock, prepared transactions, write locks
//! - NodeConfig: node settings, loadable from TOML
//!
//! A [`StorageNode`] implements [`dtranx_core::NodeSession`] directly, so it
//! can be used in-process or served over TCP by `dtranx-wire`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod node;
pub mod sharded;

pub use config::NodeConfig;
pub use node::{InDoubt, NodeStats, StorageNode};
pub use sharded::{ShardedStore, SnapshotLookup, VersionChain, VersionedValue};
