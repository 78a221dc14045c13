//! The transaction coordinator
//!
//! [`ClientTranx`] runs one transaction at a time:
//!
//! ```text
//! read / read_snapshot / write ...   accumulate in the context
//! commit                             two-phase commit, bool outcome
//! clear                              empty context, fresh transaction id
//! ```
//!
//! `clear` must follow every attempt, successful or not, including a
//! failed read. Until then the context rejects further operations.
//!
//! Writes are not visible to reads of the same transaction: `read` always
//! returns the value committed in the store.

use crate::config::ClientConfig;
use crate::locator::PartitionLocator;
use crate::pool::{Connector, SessionPool, TcpConnector};
use dtranx_concurrency::{
    CommitError, CommitOutcome, ManagerMetrics, PendingOperations, ReadError, ReadMode,
    ReadRecord, ResolveReport, SessionSource, SnapshotMarker, TransactionClosed,
    TransactionContext, TransactionManager, TransactionStatus,
};
use dtranx_core::{
    ClientId, Error, Key, NodeAddr, NodeSession, ReadReply, Result, TxnId, Value, Version,
};
use dtranx_durability::{DecisionLog, LogError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Optimistic transaction coordinator
pub struct ClientTranx {
    client_id: ClientId,
    next_seq: u64,
    locator: PartitionLocator,
    pool: SessionPool,
    manager: TransactionManager,
    ctx: TransactionContext,
}

impl ClientTranx {
    /// Coordinator talking TCP to the configured nodes
    ///
    /// Sessions are opened lazily on first use.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let connector = TcpConnector::new(config.session_options());
        Self::with_connector(config, connector)
    }

    /// Coordinator opening sessions through `connector`
    pub fn with_connector(config: ClientConfig, connector: impl Connector + 'static) -> Result<Self> {
        config.validate()?;
        let locator = PartitionLocator::new(config.nodes.clone(), config.virtual_nodes)?;
        let log = match &config.log_path {
            Some(path) if config.durability.requires_file() => {
                DecisionLog::open(path, config.durability).map_err(log_error)?
            }
            _ => DecisionLog::ephemeral(),
        };
        let manager = TransactionManager::new(log, config.retry_policy());

        let client_id = ClientId::new();
        info!(
            client = %client_id,
            nodes = locator.len(),
            durability = %config.durability,
            "transaction client ready"
        );

        let tranx = Self {
            client_id,
            next_seq: 1,
            locator,
            pool: SessionPool::new(connector),
            manager,
            ctx: TransactionContext::new(TxnId::new(client_id, 1)),
        };
        if tranx.manager.log().pending_count() > 0 {
            let report = tranx.resolve_pending();
            info!(
                resolved = report.resolved,
                remaining = report.remaining,
                "recovered pending decisions"
            );
        }
        Ok(tranx)
    }

    /// Register an established session for a node of the partition table
    ///
    /// Registered sessions are used instead of connecting and are never
    /// evicted.
    pub fn init_session(&self, addr: NodeAddr, session: Arc<dyn NodeSession>) -> Result<()> {
        if !self.locator.contains(&addr) {
            return Err(Error::Config(format!(
                "{} is not in the partition table",
                addr
            )));
        }
        self.pool.insert(addr, session);
        Ok(())
    }

    /// Coordinator identity
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Id of the current transaction
    pub fn txn_id(&self) -> TxnId {
        self.ctx.txn_id()
    }

    /// Status of the current transaction
    pub fn status(&self) -> &TransactionStatus {
        self.ctx.status()
    }

    /// Snapshot marker of the current transaction
    pub fn snapshot(&self) -> Option<&SnapshotMarker> {
        self.ctx.snapshot()
    }

    /// Reads and writes accumulated so far
    pub fn pending_operations(&self) -> PendingOperations {
        self.ctx.pending_operations()
    }

    /// Partition table
    pub fn locator(&self) -> &PartitionLocator {
        &self.locator
    }

    /// Session pool
    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Commit counters
    pub fn metrics(&self) -> ManagerMetrics {
        self.manager.metrics()
    }

    /// Decisions not yet delivered everywhere
    pub fn pending_decisions(&self) -> usize {
        self.manager.log().pending_count()
    }

    /// Read the latest committed value of `key`
    ///
    /// A failure aborts the transaction.
    pub fn read(&mut self, key: &Key) -> std::result::Result<Value, ReadError> {
        self.ctx.ensure_active()?;
        let node = self.locator.locate(key).clone();

        let reply = match self.pool.acquire(&node).and_then(|s| s.get(key)) {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail_read(key, &node, e)),
        };
        match reply {
            ReadReply::Found { value, version } => {
                self.record(key, &value, version, ReadMode::Current)?;
                Ok(value)
            }
            ReadReply::NotFound => Err(self.not_found(key)),
            ReadReply::SnapshotUnavailable(gap) => {
                let err = Error::Protocol(format!("{} answered a current read with {}", node, gap));
                Err(self.fail_read(key, &node, err))
            }
        }
    }

    /// Read `key` as of the transaction's snapshot
    ///
    /// The first snapshot read of a transaction fixes the snapshot at the
    /// highest clock of the partition table, so every commit finished
    /// before it is visible on every node. A failure aborts the
    /// transaction.
    pub fn read_snapshot(&mut self, key: &Key) -> std::result::Result<Value, ReadError> {
        self.ctx.ensure_active()?;
        let node = self.locator.locate(key).clone();

        let timestamp = match self.ctx.snapshot() {
            Some(marker) => marker.timestamp,
            None => {
                let marker = self.create_snapshot(key)?;
                self.ctx.bind_snapshot(marker).timestamp
            }
        };
        let session = match self.pool.acquire(&node) {
            Ok(session) => session,
            Err(e) => return Err(self.fail_read(key, &node, e)),
        };

        match session.get_at(key, timestamp) {
            Ok(ReadReply::Found { value, version }) => {
                self.record(key, &value, version, ReadMode::Snapshot)?;
                Ok(value)
            }
            Ok(ReadReply::NotFound) => Err(self.not_found(key)),
            Ok(ReadReply::SnapshotUnavailable(gap)) => {
                warn!(txn = %self.ctx.txn_id(), key = %key, %gap, "snapshot not available");
                self.ctx
                    .mark_aborted(format!("snapshot of {} unavailable: {}", key, gap));
                Err(ReadError::SnapshotNotCreated {
                    key: key.clone(),
                    gap,
                })
            }
            Err(e) => Err(self.fail_read(key, &node, e)),
        }
    }

    /// Buffer a write; nothing is sent before commit
    pub fn write(&mut self, key: Key, value: Value) -> std::result::Result<(), TransactionClosed> {
        self.ctx.buffer_write(key, value)
    }

    /// Commit the current transaction
    ///
    /// `true` only if every read validated and every write was applied
    /// atomically. Use [`try_commit`](Self::try_commit) to learn why a
    /// commit failed.
    pub fn commit(&mut self) -> bool {
        match self.try_commit() {
            Ok(_) => true,
            Err(e) => {
                debug!(txn = %self.ctx.txn_id(), error = %e, "commit failed");
                false
            }
        }
    }

    /// Commit the current transaction, reporting why it failed
    pub fn try_commit(&mut self) -> std::result::Result<CommitOutcome, CommitError> {
        if self.ctx.is_active() && self.manager.log().pending_count() > 0 {
            self.resolve_pending();
        }
        let locator = &self.locator;
        self.manager
            .commit(&mut self.ctx, &self.pool, |key| locator.locate(key).clone())
    }

    /// Discard the current transaction and start a new one
    ///
    /// Idempotent; valid in every state.
    pub fn clear(&mut self) {
        if self.ctx.pending_operations().is_empty() && self.ctx.is_active() {
            return;
        }
        self.next_seq += 1;
        self.ctx.reset(TxnId::new(self.client_id, self.next_seq));
    }

    /// Re-send decisions that did not reach every participant
    pub fn resolve_pending(&self) -> ResolveReport {
        self.manager.resolve_pending(&self.pool)
    }

    /// Release every node session
    ///
    /// The current transaction is discarded. The coordinator stays usable:
    /// later operations reconnect.
    pub fn close(&mut self) {
        self.clear();
        if self.manager.log().pending_count() > 0 {
            self.resolve_pending();
        }
        self.pool.close();
        info!(client = %self.client_id, "transaction client closed");
    }

    fn record(
        &mut self,
        key: &Key,
        value: &Value,
        version: Version,
        mode: ReadMode,
    ) -> std::result::Result<(), TransactionClosed> {
        self.ctx.record_read(ReadRecord {
            key: key.clone(),
            value: value.clone(),
            version,
            mode,
        })
    }

    /// Snapshot marker at the maximum clock over every node
    fn create_snapshot(&mut self, key: &Key) -> std::result::Result<SnapshotMarker, ReadError> {
        let nodes = self.locator.nodes().to_vec();
        let mut marker: Option<SnapshotMarker> = None;
        for node in nodes {
            let ts = match self.pool.acquire(&node).and_then(|s| s.snapshot_timestamp()) {
                Ok(ts) => ts,
                Err(e) => return Err(self.fail_read(key, &node, e)),
            };
            if marker.as_ref().map_or(true, |m| ts > m.timestamp) {
                marker = Some(SnapshotMarker {
                    timestamp: ts,
                    origin: node,
                });
            }
        }
        let marker = marker.ok_or_else(|| {
            ReadError::Io(Error::Config("no known partition".to_string()))
        })?;
        debug!(
            txn = %self.ctx.txn_id(),
            origin = %marker.origin,
            ts = %marker.timestamp,
            "snapshot created"
        );
        Ok(marker)
    }

    fn not_found(&mut self, key: &Key) -> ReadError {
        debug!(txn = %self.ctx.txn_id(), key = %key, "read found no data");
        self.ctx.mark_aborted(format!("{} not found", key));
        ReadError::NotFound { key: key.clone() }
    }

    fn fail_read(&mut self, key: &Key, node: &NodeAddr, err: Error) -> ReadError {
        warn!(txn = %self.ctx.txn_id(), key = %key, node = %node, error = %err, "read failed");
        self.pool.report_failure(node, &err);
        self.ctx
            .mark_aborted(format!("read of {} from {} failed: {}", key, node, err));
        ReadError::Io(err)
    }
}

fn log_error(err: LogError) -> Error {
    match err {
        LogError::Io(e) => Error::Io(e),
        LogError::Serialization(msg) => Error::Serialization(msg),
    }
}

impl std::fmt::Debug for ClientTranx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTranx")
            .field("client_id", &self.client_id)
            .field("txn_id", &self.ctx.txn_id())
            .field("status", self.ctx.status())
            .field("nodes", &self.locator.len())
            .finish()
    }
}
