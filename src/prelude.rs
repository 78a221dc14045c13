//! Convenient imports for DTranx.
//!
//! ```no_run
//! use dtranx::prelude::*;
//!
//! let db = DtranxDb::init(ClientConfig::new().nodes(["127.0.0.1:60000"]))?;
//! # Ok::<(), dtranx::Error>(())
//! ```

// Entry points
pub use crate::db::{DtranxDb, Status};
pub use crate::{ClientConfig, ClientTranx};

// Error handling
pub use crate::error::{Error, Result};
pub use crate::{CommitError, ReadError};

// Core types
pub use crate::{Key, NodeAddr, Value, Version};
