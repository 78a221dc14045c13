//! Transaction context for OCC
//!
//! A [`TransactionContext`] tracks everything one transaction did before
//! commit: the values it read (with the version observed), the writes it
//! buffered and, if it used snapshot reads, the snapshot it is bound to.
//!
//! Writes never touch the network before commit. Reads are not served from
//! the write buffer: a transaction that writes `k` and then reads `k` sees
//! the value stored before the transaction.

use crate::validation::ValidationResult;
use dtranx_core::{Key, NodeAddr, SnapshotGap, TxnId, Value, Version};
use dtranx_durability::LogError;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The context no longer accepts operations
///
/// Returned after a failed read, and after commit was invoked, until the
/// context is cleared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transaction {txn_id} is closed ({state})")]
pub struct TransactionClosed {
    /// Transaction that was closed
    pub txn_id: TxnId,
    /// State it was in
    pub state: String,
}

/// Why a read failed
///
/// Every read failure aborts the transaction.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The key has no value
    #[error("key {key} not found")]
    NotFound {
        /// Key that was read
        key: Key,
    },

    /// The snapshot cannot be served for this key
    #[error("snapshot not available for {key}: {gap}")]
    SnapshotNotCreated {
        /// Key that was read
        key: Key,
        /// Why the node could not serve it
        gap: SnapshotGap,
    },

    /// The owning node could not be reached
    #[error("read failed: {0}")]
    Io(#[from] dtranx_core::Error),

    /// The context does not accept reads
    #[error(transparent)]
    TransactionClosed(#[from] TransactionClosed),
}

impl ReadError {
    /// Check if the key simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadError::NotFound { .. })
    }
}

/// Why a commit did not happen
#[derive(Debug, Error)]
pub enum CommitError {
    /// Validation failed; nothing was applied
    #[error("commit conflict: {0}")]
    Conflict(ValidationResult),

    /// A participant could not be reached before the decision; nothing was applied
    #[error("commit failed: {0}")]
    Io(dtranx_core::Error),

    /// The decision could not be logged; nothing was applied
    #[error("commit failed: {0}")]
    Log(#[from] LogError),

    /// The context does not accept a commit
    #[error(transparent)]
    TransactionClosed(#[from] TransactionClosed),
}

impl CommitError {
    /// Check if the commit failed because of a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, CommitError::Conflict(_))
    }
}

/// How a value was read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Latest committed value
    Current,
    /// Value as of the transaction's snapshot
    Snapshot,
}

/// One read performed by a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    /// Key read
    pub key: Key,
    /// Value returned
    pub value: Value,
    /// Version of the value returned
    pub version: Version,
    /// How it was read
    pub mode: ReadMode,
}

/// Point in time shared by every snapshot read of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMarker {
    /// Snapshot timestamp
    pub timestamp: Version,
    /// Node that issued the timestamp
    pub origin: NodeAddr,
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Committing` (commit invoked)
/// - `Committing` → `Committed` | `Aborted`
/// - `Active` → `Aborted` (failed read)
///
/// Every state but `Active` rejects operations until [`TransactionContext::reset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Reads and writes accepted
    Active,
    /// Commit in progress
    Committing,
    /// Commit succeeded
    Committed,
    /// Transaction failed
    Aborted {
        /// Human-readable reason
        reason: String,
    },
}

/// Counts of buffered work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperations {
    /// Read records
    pub reads: usize,
    /// Buffered writes
    pub writes: usize,
}

impl PendingOperations {
    /// Check if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.reads == 0 && self.writes == 0
    }
}

/// State of one transaction
///
/// # Example
///
/// ```
/// use dtranx_concurrency::TransactionContext;
/// use dtranx_core::{ClientId, Key, TxnId, Value};
///
/// let mut ctx = TransactionContext::new(TxnId::new(ClientId::new(), 1));
/// ctx.buffer_write(Key::from("a"), Value::from("1")).unwrap();
/// ctx.buffer_write(Key::from("a"), Value::from("2")).unwrap();
///
/// assert_eq!(ctx.writes().len(), 1);
/// assert_eq!(ctx.writes()[&Key::from("a")], Value::from("2"));
/// ```
#[derive(Debug)]
pub struct TransactionContext {
    txn_id: TxnId,
    reads: Vec<ReadRecord>,
    writes: BTreeMap<Key, Value>,
    snapshot: Option<SnapshotMarker>,
    status: TransactionStatus,
    start_time: Instant,
}

impl TransactionContext {
    /// Create an empty active context
    pub fn new(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            reads: Vec::new(),
            writes: BTreeMap::new(),
            snapshot: None,
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    /// Transaction id
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Read records, in the order they happened
    pub fn reads(&self) -> &[ReadRecord] {
        &self.reads
    }

    /// Buffered writes
    pub fn writes(&self) -> &BTreeMap<Key, Value> {
        &self.writes
    }

    /// Snapshot marker, if a snapshot read happened
    pub fn snapshot(&self) -> Option<&SnapshotMarker> {
        self.snapshot.as_ref()
    }

    /// Check if operations are accepted
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Check if the transaction committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// Check if the transaction aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Check if the transaction buffered any write
    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Check if the transaction only read
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// Time since the context was created or last reset
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Counts of buffered work
    pub fn pending_operations(&self) -> PendingOperations {
        PendingOperations {
            reads: self.reads.len(),
            writes: self.writes.len(),
        }
    }

    /// Fail with [`TransactionClosed`] unless active
    pub fn ensure_active(&self) -> Result<(), TransactionClosed> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TransactionClosed {
                txn_id: self.txn_id,
                state: format!("{:?}", self.status),
            })
        }
    }

    /// Append a read record
    pub fn record_read(&mut self, record: ReadRecord) -> Result<(), TransactionClosed> {
        self.ensure_active()?;
        self.reads.push(record);
        Ok(())
    }

    /// Buffer a write; a later write to the same key replaces it
    pub fn buffer_write(&mut self, key: Key, value: Value) -> Result<(), TransactionClosed> {
        self.ensure_active()?;
        self.writes.insert(key, value);
        Ok(())
    }

    /// Bind the transaction to a snapshot
    ///
    /// The first marker wins; later calls return the existing one.
    pub fn bind_snapshot(&mut self, marker: SnapshotMarker) -> &SnapshotMarker {
        self.snapshot.get_or_insert(marker)
    }

    /// `Active` → `Committing`
    pub fn mark_committing(&mut self) -> Result<(), TransactionClosed> {
        self.ensure_active()?;
        self.status = TransactionStatus::Committing;
        Ok(())
    }

    /// → `Committed`
    pub fn mark_committed(&mut self) {
        self.status = TransactionStatus::Committed;
    }

    /// → `Aborted`; a second abort keeps the first reason
    pub fn mark_aborted(&mut self, reason: impl Into<String>) {
        if !self.is_aborted() {
            self.status = TransactionStatus::Aborted {
                reason: reason.into(),
            };
        }
    }

    /// Discard everything and start over as `txn_id`
    ///
    /// Keeps allocated capacity.
    pub fn reset(&mut self, txn_id: TxnId) {
        self.txn_id = txn_id;
        self.reads.clear();
        self.writes.clear();
        self.snapshot = None;
        self.status = TransactionStatus::Active;
        self.start_time = Instant::now();
    }
}
