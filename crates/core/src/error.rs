//! Infrastructure errors
//!
//! These errors describe failures of the machinery around a transaction
//! (sessions, sockets, configuration), never the outcome of a transaction
//! itself. Conflicts and missing keys are reported through
//! [`ReadReply`](crate::ReadReply) and [`Vote`](crate::Vote).

use crate::types::NodeAddr;
use thiserror::Error;

/// Infrastructure error
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on a session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request did not complete within its deadline
    #[error("request to {node} timed out after {timeout_ms}ms")]
    Timeout {
        /// Node the request was sent to
        node: NodeAddr,
        /// Deadline that expired
        timeout_ms: u64,
    },

    /// A node could not be reached or the session is no longer usable
    #[error("node {node} unavailable: {reason}")]
    Unavailable {
        /// Node that could not be reached
        node: NodeAddr,
        /// What went wrong
        reason: String,
    },

    /// The peer sent something that does not follow the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration (no partitions, bad timeouts, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation not allowed in the current state
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if retrying the operation (possibly after reconnecting) may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Timeout { .. } | Error::Unavailable { .. }
        )
    }

    /// Shorthand for [`Error::Unavailable`]
    pub fn unavailable(node: &NodeAddr, reason: impl Into<String>) -> Self {
        Error::Unavailable {
            node: node.clone(),
            reason: reason.into(),
        }
    }
}
