//! Decision log record types
//!
//! - Begin: the coordinator is about to prepare participants
//! - Commit / Abort: the decision, with the participants that must hear it
//! - End: every participant acknowledged the decision
//!
//! A transaction is pending from its first record until its `End`.

use dtranx_core::{NodeAddr, TxnId, Version};
use serde::{Deserialize, Serialize};

/// Outcome of a two-phase commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Apply at `version`
    Commit {
        /// Commit version sent to every participant
        version: Version,
    },
    /// Discard
    Abort,
}

impl Decision {
    /// Check if this is a commit
    pub fn is_commit(&self) -> bool {
        matches!(self, Decision::Commit { .. })
    }
}

/// One entry of the decision log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    /// Prepare is about to be sent
    Begin {
        /// Transaction
        txn_id: TxnId,
        /// Participants that will receive writes
        participants: Vec<NodeAddr>,
    },
    /// Commit decided
    Commit {
        /// Transaction
        txn_id: TxnId,
        /// Commit version
        version: Version,
        /// Participants that must apply the commit
        participants: Vec<NodeAddr>,
    },
    /// Abort decided
    Abort {
        /// Transaction
        txn_id: TxnId,
        /// Participants that must release their locks
        participants: Vec<NodeAddr>,
    },
    /// Decision delivered everywhere
    End {
        /// Transaction
        txn_id: TxnId,
    },
}

impl LogRecord {
    /// Build the record for a decision
    pub fn decision(txn_id: TxnId, decision: Decision, participants: Vec<NodeAddr>) -> Self {
        match decision {
            Decision::Commit { version } => LogRecord::Commit {
                txn_id,
                version,
                participants,
            },
            Decision::Abort => LogRecord::Abort {
                txn_id,
                participants,
            },
        }
    }

    /// Transaction the record belongs to
    pub fn txn_id(&self) -> TxnId {
        match self {
            LogRecord::Begin { txn_id, .. }
            | LogRecord::Commit { txn_id, .. }
            | LogRecord::Abort { txn_id, .. }
            | LogRecord::End { txn_id } => *txn_id,
        }
    }

    /// Decision carried by the record, if any
    pub fn as_decision(&self) -> Option<Decision> {
        match self {
            LogRecord::Commit { version, .. } => Some(Decision::Commit { version: *version }),
            LogRecord::Abort { .. } => Some(Decision::Abort),
            _ => None,
        }
    }

    /// Participants named by the record
    pub fn participants(&self) -> &[NodeAddr] {
        match self {
            LogRecord::Begin { participants, .. }
            | LogRecord::Commit { participants, .. }
            | LogRecord::Abort { participants, .. } => participants,
            LogRecord::End { .. } => &[],
        }
    }
}
