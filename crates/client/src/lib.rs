//! DTranx transaction client
//!
//! [`ClientTranx`] is an optimistic transaction coordinator over a
//! partitioned key-value store:
//!
//! - [`PartitionLocator`]: key → owning node, consistent hashing
//! - [`SessionPool`]: one lazily created, cached session per node
//! - [`ClientTranx`]: read / read_snapshot / write / commit / clear
//! - [`ClientConfig`]: node list, timeouts, retries, decision log
//!
//! # Example
//!
//! ```no_run
//! use dtranx_client::{ClientConfig, ClientTranx};
//! use dtranx_core::{Key, Value};
//!
//! let config = ClientConfig::new().nodes(["10.0.0.1:60000", "10.0.0.2:60000"]);
//! let mut tranx = ClientTranx::new(config)?;
//!
//! let balance = tranx.read(&Key::from("acct:1"));
//! if balance.is_ok() {
//!     tranx.write(Key::from("acct:1"), Value::from("90")).ok();
//!     tranx.write(Key::from("acct:2"), Value::from("110")).ok();
//!     let committed = tranx.commit();
//!     println!("committed: {}", committed);
//! }
//! tranx.clear();
//! # Ok::<(), dtranx_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod locator;
pub mod pool;
pub mod tranx;

pub use config::ClientConfig;
pub use locator::{PartitionLocator, DEFAULT_VIRTUAL_NODES};
pub use pool::{Connector, LocalConnector, SessionPool, TcpConnector};
pub use tranx::ClientTranx;
