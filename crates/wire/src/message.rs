//! Request and response payloads

use dtranx_core::{Key, PrepareRequest, ReadReply, TxnId, Version, Vote};
use serde::{Deserialize, Serialize};

/// A request to a storage node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Liveness check
    Ping,
    /// Latest committed value
    Get(Key),
    /// Timestamp for a new snapshot
    SnapshotTimestamp,
    /// Value as of a timestamp
    GetAt {
        /// Key to read
        key: Key,
        /// Snapshot timestamp
        timestamp: Version,
    },
    /// Phase one
    Prepare(PrepareRequest),
    /// Phase two, commit decision
    Commit {
        /// Transaction
        txn_id: TxnId,
        /// Decided commit version
        version: Version,
    },
    /// Phase two, abort decision
    Abort(TxnId),
}

impl Request {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Get(_) => "get",
            Request::SnapshotTimestamp => "snapshot_timestamp",
            Request::GetAt { .. } => "get_at",
            Request::Prepare(_) => "prepare",
            Request::Commit { .. } => "commit",
            Request::Abort(_) => "abort",
        }
    }
}

/// A storage node's reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Reply to [`Request::Ping`]
    Pong,
    /// Reply to [`Request::Get`] and [`Request::GetAt`]
    Read(ReadReply),
    /// Reply to [`Request::SnapshotTimestamp`]
    Timestamp(Version),
    /// Reply to [`Request::Prepare`]
    Vote(Vote),
    /// Reply to [`Request::Commit`] and [`Request::Abort`]
    Ack,
    /// The node could not process the request
    Error(String),
}
