//! Unified error type for DTranx.
//!
//! Each layer keeps its own error enum; this module folds them into one
//! type for callers of the facade, without losing which layer failed.

use dtranx_concurrency::{CommitError, ReadError, TransactionClosed};
use dtranx_durability::LogError;
use thiserror::Error;

/// All DTranx errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A read failed; the transaction was aborted before commit
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Commit failed; nothing was applied
    #[error(transparent)]
    Commit(#[from] CommitError),

    /// The transaction no longer accepts operations
    #[error(transparent)]
    Closed(#[from] TransactionClosed),

    /// Decision log failure
    #[error("decision log: {0}")]
    Log(#[from] LogError),

    /// Infrastructure or configuration failure
    #[error(transparent)]
    Core(#[from] dtranx_core::Error),
}

/// Result type for DTranx operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if running the whole transaction again may succeed.
    ///
    /// True for conflicts, unavailable snapshots and transient
    /// infrastructure failures. A missing key is not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Read(ReadError::SnapshotNotCreated { .. }) => true,
            Error::Read(ReadError::Io(e)) => e.is_retryable(),
            Error::Read(_) => false,
            Error::Commit(CommitError::Conflict(_)) => true,
            Error::Commit(CommitError::Io(e)) => e.is_retryable(),
            Error::Commit(_) => false,
            Error::Core(e) => e.is_retryable(),
            Error::Closed(_) | Error::Log(_) => false,
        }
    }

    /// Check if a read target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Read(e) if e.is_not_found())
    }

    /// Check if commit validation failed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Commit(e) if e.is_conflict())
    }

    /// Check if the transaction ended in its read phase.
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Error::Read(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtranx_concurrency::ValidationResult;
    use dtranx_core::{Conflict, Key, NodeAddr, SnapshotGap, Version};

    #[test]
    fn test_not_found_is_not_retryable() {
        let err = Error::from(ReadError::NotFound {
            key: Key::from("k"),
        });
        assert!(err.is_not_found());
        assert!(err.is_read_failure());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_snapshot_gap_is_retryable() {
        let err = Error::from(ReadError::SnapshotNotCreated {
            key: Key::from("k"),
            gap: SnapshotGap::PendingCommit {
                proposed: Version::new(4),
            },
        });
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_conflict_helpers() {
        let err = Error::from(CommitError::Conflict(ValidationResult::from_conflicts(vec![
            Conflict::VersionMismatch {
                key: Key::from("k"),
                observed: Version::new(1),
                current: Version::new(2),
            },
        ])));
        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert!(!err.is_read_failure());
    }

    #[test]
    fn test_core_errors_keep_retryability() {
        let node = NodeAddr::from("n1:1");
        assert!(Error::from(dtranx_core::Error::unavailable(&node, "down")).is_retryable());
        assert!(!Error::from(dtranx_core::Error::Config("bad".into())).is_retryable());
    }
}
