//! Node protocol
//!
//! The operations a transaction coordinator issues against a single storage
//! node, and the replies it gets back. The same types travel over the wire
//! (see `dtranx-wire`) and through in-process sessions.
//!
//! ## Participant protocol
//!
//! ```text
//! get / get_at            -> ReadReply
//! snapshot_timestamp      -> Version
//! prepare(reads, writes)  -> Vote::{Prepared, ReadOnly, Conflict}
//! commit(txn, version)    -> ()   (only after Prepared)
//! abort(txn)              -> ()   (idempotent)
//! ```

use crate::error::Result;
use crate::types::{Key, TxnId, Value, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reply to a point read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadReply {
    /// The key exists (at the requested point in time)
    Found {
        /// Stored value
        value: Value,
        /// Version of the stored value
        version: Version,
    },
    /// The key does not exist (at the requested point in time)
    NotFound,
    /// The node cannot serve the requested snapshot
    SnapshotUnavailable(SnapshotGap),
}

/// Why a node cannot serve a snapshot read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotGap {
    /// Versions older than `oldest_retained` were discarded
    HistoryTrimmed {
        /// Oldest version still held for the key
        oldest_retained: Version,
    },
    /// A prepared transaction may still commit at or below the snapshot
    PendingCommit {
        /// Version proposed by the prepared transaction
        proposed: Version,
    },
}

impl fmt::Display for SnapshotGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotGap::HistoryTrimmed { oldest_retained } => {
                write!(f, "history trimmed (oldest retained {})", oldest_retained)
            }
            SnapshotGap::PendingCommit { proposed } => {
                write!(f, "commit pending at {}", proposed)
            }
        }
    }
}

/// A read to validate at prepare time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadCheck {
    /// Key that was read
    pub key: Key,
    /// Version observed when it was read
    pub version: Version,
}

/// Phase-one request sent to one participant
///
/// Contains only the reads and writes owned by that participant. When the
/// transaction writes anywhere, `lock_reads` is set on every request: the
/// participant then pins the validated read keys until the decision
/// arrives, even if it stages no write itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRequest {
    /// Transaction being prepared
    pub txn_id: TxnId,
    /// Reads to validate
    pub reads: Vec<ReadCheck>,
    /// Writes to lock and stage
    pub writes: Vec<(Key, Value)>,
    /// Hold read pins until commit or abort
    pub lock_reads: bool,
}

impl PrepareRequest {
    /// Create an empty request for a transaction
    pub fn new(txn_id: TxnId) -> Self {
        PrepareRequest {
            txn_id,
            reads: Vec::new(),
            writes: Vec::new(),
            lock_reads: false,
        }
    }

    /// Check if the request stages any write
    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Check if the participant keeps state until the decision
    pub fn holds_state(&self) -> bool {
        self.has_writes() || (self.lock_reads && !self.reads.is_empty())
    }
}

/// A single reason why validation failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conflict {
    /// The key changed since it was read
    VersionMismatch {
        /// Key that changed
        key: Key,
        /// Version observed by the transaction
        observed: Version,
        /// Version currently stored (ZERO if the key is gone)
        current: Version,
    },
    /// Another prepared transaction holds the key
    Locked {
        /// Contended key
        key: Key,
        /// Transaction holding the lock
        holder: TxnId,
    },
    /// The transaction itself observed two different versions of one key
    InconsistentRead {
        /// Key read twice
        key: Key,
        /// Version seen first
        first: Version,
        /// Version seen later
        second: Version,
    },
}

impl Conflict {
    /// Key involved in the conflict
    pub fn key(&self) -> &Key {
        match self {
            Conflict::VersionMismatch { key, .. } => key,
            Conflict::Locked { key, .. } => key,
            Conflict::InconsistentRead { key, .. } => key,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::VersionMismatch {
                key,
                observed,
                current,
            } => write!(f, "{} changed: read {}, now {}", key, observed, current),
            Conflict::Locked { key, holder } => write!(f, "{} locked by {}", key, holder),
            Conflict::InconsistentRead { key, first, second } => {
                write!(f, "{} read at {} and {}", key, first, second)
            }
        }
    }
}

/// A participant's answer to [`PrepareRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    /// Reads are valid and writes are locked; waiting for the decision
    Prepared {
        /// Smallest commit version this participant accepts
        proposed: Version,
    },
    /// Reads are valid and nothing was staged; no decision needed
    ReadOnly,
    /// Validation failed; nothing was staged
    Conflict {
        /// Every conflict found; empty when the transaction was already
        /// decided at this participant
        conflicts: Vec<Conflict>,
    },
}

impl Vote {
    /// Check if the participant accepted the transaction
    pub fn is_yes(&self) -> bool {
        !matches!(self, Vote::Conflict { .. })
    }
}

/// Operations a coordinator can issue against one storage node
///
/// Implemented by the in-process node itself and by the TCP session.
/// Every method is bounded in time: an implementation that talks to the
/// network must fail with [`Error::Timeout`](crate::Error::Timeout) rather
/// than block forever.
pub trait NodeSession: Send + Sync {
    /// Read the latest committed value of a key
    fn get(&self, key: &Key) -> Result<ReadReply>;

    /// Obtain a timestamp usable as a snapshot read point
    fn snapshot_timestamp(&self) -> Result<Version>;

    /// Read the value of a key as of `timestamp`
    fn get_at(&self, key: &Key, timestamp: Version) -> Result<ReadReply>;

    /// Phase one: validate reads, lock and stage writes
    fn prepare(&self, request: &PrepareRequest) -> Result<Vote>;

    /// Phase two: apply staged writes at `version`
    fn commit(&self, txn_id: &TxnId, version: Version) -> Result<()>;

    /// Phase two: discard staged writes
    fn abort(&self, txn_id: &TxnId) -> Result<()>;

    /// Liveness check
    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
