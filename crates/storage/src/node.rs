//! Storage node: two-phase commit participant
//!
//! A node owns one partition of the key space. It serves reads directly
//! from the [`ShardedStore`] and takes part in the coordinator's commit
//! protocol:
//!
//! ```text
//! prepare  - validate read versions, refuse if a key is locked,
//!            lock write keys, pin read keys, stage writes,
//!            propose a commit version
//! commit   - apply staged writes at the decided version, release locks
//! abort    - drop staged writes, release locks
//! ```
//!
//! A prepare that carries `lock_reads` keeps its read keys pinned until the
//! decision, even when it writes nothing here. A pinned key refuses writers
//! from other transactions, so validation stays true until the transaction
//! commits on every participant.
//!
//! Decided transaction ids are remembered (a bounded window) so a prepare
//! that arrives after its own abort is refused instead of locking keys
//! that no decision will ever release.
//!
//! ## Logical clock
//!
//! Commit versions and snapshot timestamps come from one logical clock per
//! node. A proposal is always `clock + 1`; commit raises the clock to the
//! decided version; a snapshot read at `ts` raises the clock to `ts`. So
//! once a snapshot at `ts` was served, every later proposal is above `ts`
//! and the snapshot can never miss a commit. A prepared transaction whose
//! proposal is at or below `ts` makes the key unreadable at `ts` until it
//! is decided.
//!
//! ## Locking
//!
//! Prepare, commit, abort and snapshot reads run under one participant
//! lock, which makes validation and apply atomic with respect to each
//! other. Nothing ever waits for a transaction lock or read pin: a held key
//! refuses the prepare, so there are no deadlocks.

use crate::config::NodeConfig;
use crate::sharded::{ShardedStore, SnapshotLookup};
use chrono::{DateTime, Utc};
use dtranx_core::{
    Conflict, Key, NodeSession, PrepareRequest, ReadReply, Result, SnapshotGap, TxnId, Value,
    Version, Vote,
};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Decided transaction ids remembered per node
pub const DECIDED_WINDOW: usize = 64 * 1024;

/// Writes staged and reads pinned by a prepared transaction
#[derive(Debug, Clone)]
struct PreparedTxn {
    writes: Vec<(Key, Value)>,
    pinned: Vec<Key>,
    proposed: Version,
    prepared_at: DateTime<Utc>,
}

/// Recently decided transactions, oldest evicted first
#[derive(Debug, Default)]
struct DecidedWindow {
    order: VecDeque<TxnId>,
    ids: FxHashSet<TxnId>,
}

impl DecidedWindow {
    fn insert(&mut self, txn_id: TxnId) {
        if !self.ids.insert(txn_id) {
            return;
        }
        self.order.push_back(txn_id);
        if self.order.len() > DECIDED_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, txn_id: &TxnId) -> bool {
        self.ids.contains(txn_id)
    }
}

#[derive(Debug, Default)]
struct ParticipantState {
    prepared: FxHashMap<TxnId, PreparedTxn>,
    locks: FxHashMap<Key, TxnId>,
    pins: FxHashMap<Key, SmallVec<[TxnId; 2]>>,
    decided: DecidedWindow,
}

impl ParticipantState {
    /// A transaction other than `txn_id` pinning `key`
    fn pinned_by_other(&self, key: &Key, txn_id: &TxnId) -> Option<TxnId> {
        self.pins
            .get(key)
            .and_then(|readers| readers.iter().find(|r| *r != txn_id).copied())
    }

    fn release(&mut self, txn_id: &TxnId, prepared: &PreparedTxn) {
        for (key, _) in &prepared.writes {
            if self.locks.get(key) == Some(txn_id) {
                self.locks.remove(key);
            }
        }
        for key in &prepared.pinned {
            if let Some(readers) = self.pins.get_mut(key) {
                readers.retain(|r| *r != *txn_id);
                if readers.is_empty() {
                    self.pins.remove(key);
                }
            }
        }
    }
}

/// A prepared transaction still waiting for its decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InDoubt {
    /// Transaction id
    pub txn_id: TxnId,
    /// Version proposed at prepare time
    pub proposed: Version,
    /// Number of keys locked
    pub keys: usize,
    /// When the prepare was accepted
    pub prepared_at: DateTime<Utc>,
}

/// Node counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    /// Keys stored
    pub keys: usize,
    /// Current logical clock
    pub clock: Version,
    /// Prepared transactions waiting for a decision
    pub prepared: usize,
    /// Keys locked by prepared transactions
    pub locked_keys: usize,
    /// Keys pinned by reads of prepared transactions
    pub pinned_keys: usize,
}

/// A storage node
///
/// # Example
///
/// ```
/// use dtranx_core::{ClientId, Key, PrepareRequest, ReadReply, TxnId, Value, Vote};
/// use dtranx_storage::{NodeConfig, StorageNode};
///
/// let node = StorageNode::new(NodeConfig::default());
/// let txn = TxnId::new(ClientId::new(), 1);
///
/// let mut request = PrepareRequest::new(txn);
/// request.writes.push((Key::from("a"), Value::from("1")));
///
/// let Vote::Prepared { proposed } = node.prepare(&request) else { panic!() };
/// node.commit(&txn, proposed);
///
/// assert!(matches!(node.get(&Key::from("a")), ReadReply::Found { .. }));
/// ```
pub struct StorageNode {
    config: NodeConfig,
    store: ShardedStore,
    clock: AtomicU64,
    participant: Mutex<ParticipantState>,
}

impl StorageNode {
    /// Create an empty node
    ///
    /// A `max_versions` of zero is raised to one.
    pub fn new(mut config: NodeConfig) -> Self {
        if config.max_versions == 0 {
            warn!("max_versions must be at least 1, using 1");
            config.max_versions = 1;
        }
        let store = ShardedStore::new(config.max_versions);
        Self {
            config,
            store,
            clock: AtomicU64::new(0),
            participant: Mutex::new(ParticipantState::default()),
        }
    }

    /// Node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Underlying store
    pub fn store(&self) -> &ShardedStore {
        &self.store
    }

    /// Current logical clock
    pub fn clock(&self) -> Version {
        Version::new(self.clock.load(Ordering::SeqCst))
    }

    /// Advance the clock and return the new value
    fn tick(&self) -> Version {
        Version::new(self.clock.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Raise the clock to at least `version`
    fn observe(&self, version: Version) {
        self.clock.fetch_max(version.as_u64(), Ordering::SeqCst);
    }

    /// Read the latest committed value
    ///
    /// Lock-free: staged writes of prepared transactions are not visible.
    pub fn get(&self, key: &Key) -> ReadReply {
        match self.store.get(key) {
            Some(vv) => ReadReply::Found {
                value: vv.value,
                version: vv.version,
            },
            None => ReadReply::NotFound,
        }
    }

    /// Timestamp for a new snapshot: everything committed so far
    pub fn snapshot_timestamp(&self) -> Version {
        self.clock()
    }

    /// Read a key as of `timestamp`
    pub fn get_at(&self, key: &Key, timestamp: Version) -> ReadReply {
        let state = self.participant.lock();
        self.observe(timestamp);

        if let Some(holder) = state.locks.get(key) {
            if let Some(prepared) = state.prepared.get(holder) {
                if prepared.proposed <= timestamp {
                    trace!(key = %key, ts = %timestamp, "snapshot read blocked by prepared txn");
                    return ReadReply::SnapshotUnavailable(SnapshotGap::PendingCommit {
                        proposed: prepared.proposed,
                    });
                }
            }
        }

        match self.store.get_at(key, timestamp) {
            SnapshotLookup::Visible(vv) => ReadReply::Found {
                value: vv.value,
                version: vv.version,
            },
            SnapshotLookup::Absent => ReadReply::NotFound,
            SnapshotLookup::Trimmed { oldest_retained } => {
                ReadReply::SnapshotUnavailable(SnapshotGap::HistoryTrimmed { oldest_retained })
            }
        }
    }

    /// Phase one of two-phase commit
    ///
    /// Validates every read against the current version, refuses keys
    /// locked by another transaction and writes to keys pinned by another
    /// transaction, then locks the write keys and pins the read keys. A
    /// request that holds nothing (no writes, no `lock_reads`) keeps no
    /// state and votes [`Vote::ReadOnly`].
    ///
    /// Preparing the same transaction twice returns the original vote. A
    /// transaction already decided here is refused with no conflicts.
    pub fn prepare(&self, request: &PrepareRequest) -> Vote {
        let mut state = self.participant.lock();
        let txn_id = request.txn_id;

        if let Some(existing) = state.prepared.get(&txn_id) {
            return Vote::Prepared {
                proposed: existing.proposed,
            };
        }
        if state.decided.contains(&txn_id) {
            debug!(txn = %txn_id, "prepare for decided transaction refused");
            return Vote::Conflict {
                conflicts: Vec::new(),
            };
        }

        let mut conflicts = Vec::new();
        for read in &request.reads {
            if let Some(holder) = state.locks.get(&read.key) {
                if *holder != txn_id {
                    conflicts.push(Conflict::Locked {
                        key: read.key.clone(),
                        holder: *holder,
                    });
                    continue;
                }
            }
            let current = self.store.current_version(&read.key);
            if current != read.version {
                conflicts.push(Conflict::VersionMismatch {
                    key: read.key.clone(),
                    observed: read.version,
                    current,
                });
            }
        }
        for (key, _) in &request.writes {
            let holder = match state.locks.get(key) {
                Some(holder) if *holder != txn_id => Some(*holder),
                _ => state.pinned_by_other(key, &txn_id),
            };
            if let Some(holder) = holder {
                conflicts.push(Conflict::Locked {
                    key: key.clone(),
                    holder,
                });
            }
        }

        if !conflicts.is_empty() {
            debug!(txn = %txn_id, conflicts = conflicts.len(), "prepare refused");
            return Vote::Conflict { conflicts };
        }
        if !request.holds_state() {
            return Vote::ReadOnly;
        }

        let proposed = self.tick();
        for (key, _) in &request.writes {
            state.locks.insert(key.clone(), txn_id);
        }
        let pinned: Vec<Key> = request.reads.iter().map(|r| r.key.clone()).collect();
        for key in &pinned {
            let readers = state.pins.entry(key.clone()).or_default();
            if !readers.contains(&txn_id) {
                readers.push(txn_id);
            }
        }
        debug!(
            txn = %txn_id,
            proposed = %proposed,
            writes = request.writes.len(),
            pinned = pinned.len(),
            "prepared"
        );
        state.prepared.insert(
            txn_id,
            PreparedTxn {
                writes: request.writes.clone(),
                pinned,
                proposed,
                prepared_at: Utc::now(),
            },
        );
        Vote::Prepared { proposed }
    }

    /// Phase two: apply a prepared transaction at `version`
    ///
    /// Returns `false` if the transaction is not prepared here (already
    /// committed, aborted, or never prepared). Repeated delivery of the
    /// same decision is therefore harmless.
    pub fn commit(&self, txn_id: &TxnId, version: Version) -> bool {
        let mut state = self.participant.lock();
        let Some(prepared) = state.prepared.remove(txn_id) else {
            debug!(txn = %txn_id, "commit for unknown transaction ignored");
            return false;
        };

        self.observe(version);
        self.store.apply_batch(&prepared.writes, version);
        state.release(txn_id, &prepared);
        state.decided.insert(*txn_id);
        debug!(txn = %txn_id, version = %version, writes = prepared.writes.len(), "committed");
        true
    }

    /// Phase two: drop a prepared transaction
    ///
    /// Returns `false` if nothing was prepared for `txn_id`. Either way the
    /// id is remembered, so a late prepare of it is refused.
    pub fn abort(&self, txn_id: &TxnId) -> bool {
        let mut state = self.participant.lock();
        state.decided.insert(*txn_id);
        let Some(prepared) = state.prepared.remove(txn_id) else {
            return false;
        };
        state.release(txn_id, &prepared);
        debug!(txn = %txn_id, "aborted");
        true
    }

    /// Prepared transactions still waiting for a decision, oldest first
    pub fn in_doubt(&self) -> Vec<InDoubt> {
        let state = self.participant.lock();
        let mut list: Vec<InDoubt> = state
            .prepared
            .iter()
            .map(|(txn_id, p)| InDoubt {
                txn_id: *txn_id,
                proposed: p.proposed,
                keys: p.writes.len(),
                prepared_at: p.prepared_at,
            })
            .collect();
        list.sort_by_key(|d| d.proposed);
        list
    }

    /// Node counters
    pub fn stats(&self) -> NodeStats {
        let state = self.participant.lock();
        NodeStats {
            keys: self.store.len(),
            clock: self.clock(),
            prepared: state.prepared.len(),
            locked_keys: state.locks.len(),
            pinned_keys: state.pins.len(),
        }
    }
}

impl std::fmt::Debug for StorageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageNode")
            .field("clock", &self.clock())
            .field("store", &self.store)
            .finish()
    }
}

impl NodeSession for StorageNode {
    fn get(&self, key: &Key) -> Result<ReadReply> {
        Ok(StorageNode::get(self, key))
    }

    fn snapshot_timestamp(&self) -> Result<Version> {
        Ok(StorageNode::snapshot_timestamp(self))
    }

    fn get_at(&self, key: &Key, timestamp: Version) -> Result<ReadReply> {
        Ok(StorageNode::get_at(self, key, timestamp))
    }

    fn prepare(&self, request: &PrepareRequest) -> Result<Vote> {
        Ok(StorageNode::prepare(self, request))
    }

    fn commit(&self, txn_id: &TxnId, version: Version) -> Result<()> {
        StorageNode::commit(self, txn_id, version);
        Ok(())
    }

    fn abort(&self, txn_id: &TxnId) -> Result<()> {
        StorageNode::abort(self, txn_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtranx_core::{ClientId, ReadCheck};

    fn node() -> StorageNode {
        StorageNode::new(NodeConfig::default())
    }

    fn txn(seq: u64) -> TxnId {
        TxnId::new(ClientId::from_bytes([1u8; 16]), seq)
    }

    fn write_request(txn_id: TxnId, pairs: &[(&str, &str)]) -> PrepareRequest {
        let mut req = PrepareRequest::new(txn_id);
        for (k, v) in pairs {
            req.writes.push((Key::from(*k), Value::from(*v)));
        }
        req
    }

    fn commit_writes(node: &StorageNode, txn_id: TxnId, pairs: &[(&str, &str)]) -> Version {
        match node.prepare(&write_request(txn_id, pairs)) {
            Vote::Prepared { proposed } => {
                assert!(node.commit(&txn_id, proposed));
                proposed
            }
            other => panic!("unexpected vote {:?}", other),
        }
    }

    #[test]
    fn test_prepare_commit_applies_writes() {
        let node = node();
        let version = commit_writes(&node, txn(1), &[("a", "1"), ("b", "2")]);

        assert_eq!(
            node.get(&Key::from("a")),
            ReadReply::Found {
                value: Value::from("1"),
                version
            }
        );
        assert_eq!(node.stats().prepared, 0);
        assert_eq!(node.stats().locked_keys, 0);
    }

    #[test]
    fn test_prepared_writes_are_invisible() {
        let node = node();
        let vote = node.prepare(&write_request(txn(1), &[("a", "1")]));
        assert!(matches!(vote, Vote::Prepared { .. }));
        assert_eq!(node.get(&Key::from("a")), ReadReply::NotFound);
        assert_eq!(node.in_doubt().len(), 1);
    }

    #[test]
    fn test_abort_releases_locks() {
        let node = node();
        node.prepare(&write_request(txn(1), &[("a", "1")]));
        assert!(node.abort(&txn(1)));
        assert!(!node.abort(&txn(1)));
        assert_eq!(node.get(&Key::from("a")), ReadReply::NotFound);

        let vote = node.prepare(&write_request(txn(2), &[("a", "2")]));
        assert!(matches!(vote, Vote::Prepared { .. }));
    }

    #[test]
    fn test_write_write_conflict_on_locked_key() {
        let node = node();
        node.prepare(&write_request(txn(1), &[("a", "1")]));
        match node.prepare(&write_request(txn(2), &[("a", "2")])) {
            Vote::Conflict { conflicts } => {
                assert_eq!(
                    conflicts,
                    vec![Conflict::Locked {
                        key: Key::from("a"),
                        holder: txn(1)
                    }]
                );
            }
            other => panic!("unexpected vote {:?}", other),
        }
    }

    #[test]
    fn test_stale_read_is_refused() {
        let node = node();
        let v1 = commit_writes(&node, txn(1), &[("a", "1")]);
        let v2 = commit_writes(&node, txn(2), &[("a", "2")]);

        let mut req = PrepareRequest::new(txn(3));
        req.reads.push(ReadCheck {
            key: Key::from("a"),
            version: v1,
        });
        match node.prepare(&req) {
            Vote::Conflict { conflicts } => assert_eq!(
                conflicts,
                vec![Conflict::VersionMismatch {
                    key: Key::from("a"),
                    observed: v1,
                    current: v2
                }]
            ),
            other => panic!("unexpected vote {:?}", other),
        }
    }

    #[test]
    fn test_read_only_vote_keeps_no_state() {
        let node = node();
        let v1 = commit_writes(&node, txn(1), &[("a", "1")]);
        let mut req = PrepareRequest::new(txn(2));
        req.reads.push(ReadCheck {
            key: Key::from("a"),
            version: v1,
        });
        assert_eq!(node.prepare(&req), Vote::ReadOnly);
        assert_eq!(node.stats().prepared, 0);
    }

    #[test]
    fn test_read_of_key_locked_by_other_txn_conflicts() {
        let node = node();
        let v1 = commit_writes(&node, txn(1), &[("a", "1")]);
        node.prepare(&write_request(txn(2), &[("a", "2")]));

        let mut req = PrepareRequest::new(txn(3));
        req.reads.push(ReadCheck {
            key: Key::from("a"),
            version: v1,
        });
        assert!(matches!(node.prepare(&req), Vote::Conflict { .. }));
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let node = node();
        let req = write_request(txn(1), &[("a", "1")]);
        let first = node.prepare(&req);
        let second = node.prepare(&req);
        assert_eq!(first, second);
        assert_eq!(node.stats().prepared, 1);
    }

    #[test]
    fn test_commit_unknown_txn_is_ignored() {
        let node = node();
        assert!(!node.commit(&txn(9), Version::new(5)));
        assert_eq!(node.stats().keys, 0);
    }

    #[test]
    fn test_commit_raises_clock() {
        let node = node();
        node.prepare(&write_request(txn(1), &[("a", "1")]));
        node.commit(&txn(1), Version::new(50));
        assert_eq!(node.clock(), Version::new(50));

        match node.prepare(&write_request(txn(2), &[("b", "1")])) {
            Vote::Prepared { proposed } => assert_eq!(proposed, Version::new(51)),
            other => panic!("unexpected vote {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_read_ignores_later_commits() {
        let node = node();
        commit_writes(&node, txn(1), &[("a", "old")]);
        let ts = node.snapshot_timestamp();
        commit_writes(&node, txn(2), &[("a", "new")]);

        match node.get_at(&Key::from("a"), ts) {
            ReadReply::Found { value, .. } => assert_eq!(value, Value::from("old")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_read_raises_clock() {
        let node = node();
        node.get_at(&Key::from("a"), Version::new(100));
        assert_eq!(node.clock(), Version::new(100));
        match node.prepare(&write_request(txn(1), &[("a", "1")])) {
            Vote::Prepared { proposed } => assert!(proposed > Version::new(100)),
            other => panic!("unexpected vote {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_read_blocked_by_pending_commit() {
        let node = node();
        let proposed = match node.prepare(&write_request(txn(1), &[("a", "1")])) {
            Vote::Prepared { proposed } => proposed,
            other => panic!("unexpected vote {:?}", other),
        };
        assert_eq!(
            node.get_at(&Key::from("a"), proposed),
            ReadReply::SnapshotUnavailable(SnapshotGap::PendingCommit { proposed })
        );
        // A snapshot below the proposal cannot see the commit anyway
        assert_eq!(
            node.get_at(&Key::from("a"), Version::ZERO),
            ReadReply::NotFound
        );
    }

    #[test]
    fn test_snapshot_read_of_trimmed_history() {
        let node = StorageNode::new(NodeConfig::default().max_versions(1));
        commit_writes(&node, txn(1), &[("a", "1")]);
        let ts = node.snapshot_timestamp();
        commit_writes(&node, txn(2), &[("a", "2")]);

        assert!(matches!(
            node.get_at(&Key::from("a"), ts),
            ReadReply::SnapshotUnavailable(SnapshotGap::HistoryTrimmed { .. })
        ));
    }

    fn read_request(txn_id: TxnId, key: &str, version: Version) -> PrepareRequest {
        let mut req = PrepareRequest::new(txn_id);
        req.reads.push(ReadCheck {
            key: Key::from(key),
            version,
        });
        req.lock_reads = true;
        req
    }

    #[test]
    fn test_pinned_read_refuses_other_writers() {
        let node = node();
        let v1 = commit_writes(&node, txn(1), &[("a", "1")]);

        let vote = node.prepare(&read_request(txn(2), "a", v1));
        assert!(matches!(vote, Vote::Prepared { .. }));
        assert_eq!(node.stats().pinned_keys, 1);
        assert_eq!(node.in_doubt().len(), 1);

        match node.prepare(&write_request(txn(3), &[("a", "2")])) {
            Vote::Conflict { conflicts } => assert_eq!(
                conflicts,
                vec![Conflict::Locked {
                    key: Key::from("a"),
                    holder: txn(2)
                }]
            ),
            other => panic!("unexpected vote {:?}", other),
        }

        // Other readers share the pin
        assert!(node.prepare(&read_request(txn(4), "a", v1)).is_yes());
        assert_eq!(node.stats().pinned_keys, 1);
    }

    #[test]
    fn test_pins_released_by_decision() {
        let node = node();
        let v1 = commit_writes(&node, txn(1), &[("a", "1"), ("b", "1")]);

        let committed = match node.prepare(&read_request(txn(2), "a", v1)) {
            Vote::Prepared { proposed } => proposed,
            other => panic!("unexpected vote {:?}", other),
        };
        node.prepare(&read_request(txn(3), "b", v1));
        assert_eq!(node.stats().pinned_keys, 2);

        assert!(node.commit(&txn(2), committed));
        assert!(node.abort(&txn(3)));
        assert_eq!(node.stats().pinned_keys, 0);
        assert_eq!(node.stats().prepared, 0);
        // A pin-only commit writes nothing
        assert_eq!(node.store().current_version(&Key::from("a")), v1);
        assert!(node.prepare(&write_request(txn(4), &[("a", "2"), ("b", "2")])).is_yes());
    }

    #[test]
    fn test_reads_without_lock_flag_keep_no_pins() {
        let node = node();
        let v1 = commit_writes(&node, txn(1), &[("a", "1")]);
        let mut req = read_request(txn(2), "a", v1);
        req.lock_reads = false;
        assert_eq!(node.prepare(&req), Vote::ReadOnly);
        assert_eq!(node.stats().pinned_keys, 0);
    }

    #[test]
    fn test_prepare_after_abort_is_refused() {
        let node = node();
        // Abort overtakes its own prepare
        assert!(!node.abort(&txn(1)));
        assert_eq!(
            node.prepare(&write_request(txn(1), &[("k", "late")])),
            Vote::Conflict {
                conflicts: Vec::new()
            }
        );
        assert_eq!(node.stats().locked_keys, 0);
        assert!(node.in_doubt().is_empty());

        assert!(node.prepare(&write_request(txn(2), &[("k", "next")])).is_yes());
    }

    #[test]
    fn test_prepare_after_commit_is_refused() {
        let node = node();
        commit_writes(&node, txn(1), &[("a", "1")]);
        assert!(!node.prepare(&write_request(txn(1), &[("a", "again")])).is_yes());
        assert_eq!(node.stats().locked_keys, 0);
    }

    #[test]
    fn test_decided_window_is_bounded() {
        let mut window = DecidedWindow::default();
        for seq in 0..(DECIDED_WINDOW as u64 + 10) {
            window.insert(txn(seq));
        }
        assert_eq!(window.order.len(), DECIDED_WINDOW);
        assert!(!window.contains(&txn(0)));
        assert!(window.contains(&txn(DECIDED_WINDOW as u64 + 9)));
    }

    #[test]
    fn test_zero_max_versions_is_raised() {
        let node = StorageNode::new(NodeConfig::default().max_versions(0));
        assert_eq!(node.config().max_versions, 1);
        commit_writes(&node, txn(1), &[("a", "1")]);
        let ts = node.snapshot_timestamp();
        match node.get_at(&Key::from("a"), ts) {
            ReadReply::Found { value, .. } => assert_eq!(value, Value::from("1")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_in_doubt_sorted_by_proposal() {
        let node = node();
        node.prepare(&write_request(txn(1), &[("a", "1")]));
        node.prepare(&write_request(txn(2), &[("b", "1"), ("c", "1")]));
        let list = node.in_doubt();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].txn_id, txn(1));
        assert_eq!(list[1].keys, 2);
    }
}
