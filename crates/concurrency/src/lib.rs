//! Concurrency layer for DTranx
//!
//! This crate implements optimistic concurrency control (OCC) across
//! partitions:
//! - [`TransactionContext`]: read records, buffered writes, snapshot marker
//! - Read de-duplication and commit planning per participant
//! - [`TransactionManager`]: two-phase commit with a decision log

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod validation;

pub use manager::{
    conflict_keys, CommitOutcome, ManagerMetrics, ResolveReport, RetryPolicy, SessionSource,
    TransactionManager,
};
pub use transaction::{
    CommitError, PendingOperations, ReadError, ReadMode, ReadRecord, SnapshotMarker,
    TransactionClosed, TransactionContext, TransactionStatus,
};
pub use validation::{dedup_reads, plan_commit, CommitPlan, ValidationResult};
