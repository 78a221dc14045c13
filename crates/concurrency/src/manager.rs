//! Transaction manager: two-phase commit driver
//!
//! Provides atomic commit across partitions by orchestrating:
//! 1. Planning (local read-set check, grouping per participant)
//! 2. Prepare (validation, write locks and read pins at every participant)
//! 3. Decision (logged before anyone hears it)
//! 4. Delivery (commit or abort to the participants holding locks)
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. mark_committing()          - context stops accepting operations
//! 2. plan_commit()              - local conflicts abort here
//! 3. log Begin                  - only if something is written
//!                                 (lists every participant, readers too)
//! 4. prepare on every participant, concurrently
//! 5. IF any Conflict vote or I/O failure:
//!        log Abort, send abort, return error
//! 6. commit version = max(proposed)
//! 7. log Commit                 - DECISION POINT
//! 8. send commit to Prepared participants (retried)
//! 9. log End once every participant acknowledged
//! ```
//!
//! If the coordinator stops before step 7 the transaction is aborted on
//! recovery (presumed abort). After step 7 the transaction is committed:
//! participants that missed the decision keep it pending in the log and
//! [`TransactionManager::resolve_pending`] re-sends it.

use crate::transaction::{CommitError, TransactionContext};
use crate::validation::{plan_commit, CommitPlan, ValidationResult};
use dtranx_core::{Conflict, Key, NodeAddr, NodeSession, PrepareRequest, TxnId, Version, Vote};
use dtranx_durability::{Decision, DecisionLog};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Where the manager gets sessions from
pub trait SessionSource: Send + Sync {
    /// Session to `node`, connecting if needed
    fn session(&self, node: &NodeAddr) -> dtranx_core::Result<Arc<dyn NodeSession>>;

    /// A request to `node` failed; the source may drop the session
    fn report_failure(&self, _node: &NodeAddr, _error: &dtranx_core::Error) {}
}

/// How decisions are re-sent to unreachable participants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub retries: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(20),
        }
    }
}

impl RetryPolicy {
    /// No retries, no backoff
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

/// A successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Transaction
    pub txn_id: TxnId,
    /// Commit version; `None` for a read-only transaction
    pub version: Option<Version>,
    /// Participants contacted
    pub participants: usize,
    /// Participants that have not acknowledged the commit yet
    pub undelivered: Vec<NodeAddr>,
}

impl CommitOutcome {
    /// Check if the transaction wrote nothing
    pub fn is_read_only(&self) -> bool {
        self.version.is_none()
    }
}

/// Result of [`TransactionManager::resolve_pending`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Transactions whose decision reached every participant
    pub resolved: usize,
    /// Transactions still pending
    pub remaining: usize,
}

/// Commit counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerMetrics {
    /// Transactions committed with writes
    pub committed: u64,
    /// Read-only transactions committed
    pub read_only: u64,
    /// Transactions aborted by a conflict
    pub conflicts: u64,
    /// Transactions aborted by an unreachable participant or log failure
    pub failures: u64,
    /// Decisions that could not be delivered during commit
    pub undelivered: u64,
}

#[derive(Default)]
struct Counters {
    committed: AtomicU64,
    read_only: AtomicU64,
    conflicts: AtomicU64,
    failures: AtomicU64,
    undelivered: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ManagerMetrics {
        ManagerMetrics {
            committed: self.committed.load(Ordering::Relaxed),
            read_only: self.read_only.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            undelivered: self.undelivered.load(Ordering::Relaxed),
        }
    }
}

/// What the prepare round produced
enum PrepareRound {
    /// Every participant voted yes
    Accepted {
        prepared: Vec<(NodeAddr, Version)>,
    },
    /// At least one participant refused
    Refused(ValidationResult),
    /// At least one participant could not be reached
    Failed(dtranx_core::Error),
}

/// Drives two-phase commit for one coordinator
pub struct TransactionManager {
    log: DecisionLog,
    retry: RetryPolicy,
    counters: Counters,
}

impl TransactionManager {
    /// Create a manager writing decisions to `log`
    pub fn new(log: DecisionLog, retry: RetryPolicy) -> Self {
        Self {
            log,
            retry,
            counters: Counters::default(),
        }
    }

    /// Decision log
    pub fn log(&self) -> &DecisionLog {
        &self.log
    }

    /// Retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Commit counters
    pub fn metrics(&self) -> ManagerMetrics {
        self.counters.snapshot()
    }

    /// Commit the transaction held by `ctx`
    ///
    /// On return the context is `Committed` or `Aborted`; it never stays
    /// `Committing`. Partial application is impossible: either every
    /// participant receives the commit decision (now or through
    /// [`resolve_pending`](Self::resolve_pending)) or none does.
    pub fn commit<F>(
        &self,
        ctx: &mut TransactionContext,
        sessions: &dyn SessionSource,
        locate: F,
    ) -> Result<CommitOutcome, CommitError>
    where
        F: Fn(&Key) -> NodeAddr,
    {
        ctx.mark_committing()?;
        let txn_id = ctx.txn_id();

        let plan = match plan_commit(ctx, locate) {
            Ok(plan) => plan,
            Err(conflicts) => {
                debug!(txn = %txn_id, %conflicts, "local validation failed");
                ctx.mark_aborted(format!("validation failed: {}", conflicts));
                Counters::bump(&self.counters.conflicts);
                return Err(CommitError::Conflict(conflicts));
            }
        };

        if plan.is_empty() {
            ctx.mark_committed();
            Counters::bump(&self.counters.read_only);
            return Ok(CommitOutcome {
                txn_id,
                version: None,
                participants: 0,
                undelivered: Vec::new(),
            });
        }

        let locking = plan.locking_participants();
        if !locking.is_empty() {
            if let Err(e) = self.log.begin(txn_id, locking.clone()) {
                ctx.mark_aborted(format!("decision log failed: {}", e));
                Counters::bump(&self.counters.failures);
                return Err(CommitError::Log(e));
            }
        }

        match self.prepare_all(&plan, sessions) {
            PrepareRound::Accepted { prepared } if prepared.is_empty() => {
                debug!(txn = %txn_id, participants = plan.participant_count(), "read-only commit");
                ctx.mark_committed();
                Counters::bump(&self.counters.read_only);
                Ok(CommitOutcome {
                    txn_id,
                    version: None,
                    participants: plan.participant_count(),
                    undelivered: Vec::new(),
                })
            }
            PrepareRound::Accepted { prepared } => {
                self.finish_commit(ctx, sessions, &plan, prepared)
            }
            PrepareRound::Refused(conflicts) => {
                warn!(txn = %txn_id, %conflicts, "prepare refused, aborting");
                self.abort_participants(txn_id, &locking, sessions);
                ctx.mark_aborted(format!("validation failed: {}", conflicts));
                Counters::bump(&self.counters.conflicts);
                Err(CommitError::Conflict(conflicts))
            }
            PrepareRound::Failed(err) => {
                warn!(txn = %txn_id, error = %err, "prepare failed, aborting");
                self.abort_participants(txn_id, &locking, sessions);
                ctx.mark_aborted(format!("participant unreachable: {}", err));
                Counters::bump(&self.counters.failures);
                Err(CommitError::Io(err))
            }
        }
    }

    fn finish_commit(
        &self,
        ctx: &mut TransactionContext,
        sessions: &dyn SessionSource,
        plan: &CommitPlan,
        prepared: Vec<(NodeAddr, Version)>,
    ) -> Result<CommitOutcome, CommitError> {
        let txn_id = ctx.txn_id();
        let version = prepared
            .iter()
            .map(|(_, proposed)| *proposed)
            .max()
            .unwrap_or(Version::ZERO);
        let nodes: Vec<NodeAddr> = prepared.into_iter().map(|(addr, _)| addr).collect();

        // DECISION POINT
        let decision = Decision::Commit { version };
        if let Err(e) = self.log.decide(txn_id, decision, nodes.clone()) {
            error!(txn = %txn_id, error = %e, "cannot log commit decision, aborting");
            self.deliver(txn_id, Decision::Abort, &nodes, sessions);
            ctx.mark_aborted(format!("decision log failed: {}", e));
            Counters::bump(&self.counters.failures);
            return Err(CommitError::Log(e));
        }

        let undelivered = self.deliver(txn_id, decision, &nodes, sessions);
        if undelivered.is_empty() {
            self.end(txn_id);
        } else {
            error!(
                txn = %txn_id,
                version = %version,
                nodes = ?undelivered,
                "commit decision not delivered, left pending"
            );
            Counters::bump(&self.counters.undelivered);
        }

        debug!(txn = %txn_id, version = %version, participants = plan.participant_count(), "committed");
        ctx.mark_committed();
        Counters::bump(&self.counters.committed);
        Ok(CommitOutcome {
            txn_id,
            version: Some(version),
            participants: plan.participant_count(),
            undelivered,
        })
    }

    fn prepare_all(&self, plan: &CommitPlan, sessions: &dyn SessionSource) -> PrepareRound {
        let votes: Vec<(NodeAddr, dtranx_core::Result<Vote>)> = if plan.participant_count() == 1 {
            plan.requests()
                .map(|(addr, req)| (addr.clone(), prepare_one(sessions, addr, req)))
                .collect()
        } else {
            thread::scope(|scope| {
                let handles: Vec<_> = plan
                    .requests()
                    .map(|(addr, req)| {
                        let handle = scope.spawn(move || prepare_one(sessions, addr, req));
                        (addr, handle)
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(addr, handle)| {
                        let vote = handle.join().unwrap_or_else(|_| {
                            Err(dtranx_core::Error::InvalidState(format!(
                                "prepare to {} panicked",
                                addr
                            )))
                        });
                        (addr.clone(), vote)
                    })
                    .collect()
            })
        };

        let mut prepared = Vec::new();
        let mut refused = ValidationResult::ok();
        let mut failure = None;
        for (addr, vote) in votes {
            match vote {
                Ok(Vote::Prepared { proposed }) => prepared.push((addr, proposed)),
                Ok(Vote::ReadOnly) => {}
                Ok(Vote::Conflict { conflicts }) => {
                    refused.merge(ValidationResult::from_conflicts(conflicts));
                }
                Err(e) => {
                    sessions.report_failure(&addr, &e);
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        if !refused.is_valid() {
            PrepareRound::Refused(refused)
        } else if let Some(err) = failure {
            PrepareRound::Failed(err)
        } else {
            PrepareRound::Accepted { prepared }
        }
    }

    fn abort_participants(&self, txn_id: TxnId, nodes: &[NodeAddr], sessions: &dyn SessionSource) {
        if nodes.is_empty() {
            return;
        }
        if let Err(e) = self.log.decide(txn_id, Decision::Abort, nodes.to_vec()) {
            // Presumed abort covers a missing Abort record
            warn!(txn = %txn_id, error = %e, "cannot log abort decision");
        }
        let undelivered = self.deliver(txn_id, Decision::Abort, nodes, sessions);
        if undelivered.is_empty() {
            self.end(txn_id);
        } else {
            warn!(txn = %txn_id, nodes = ?undelivered, "abort not delivered, left pending");
        }
    }

    /// Send `decision` to every node, return the nodes that never acknowledged
    fn deliver(
        &self,
        txn_id: TxnId,
        decision: Decision,
        nodes: &[NodeAddr],
        sessions: &dyn SessionSource,
    ) -> Vec<NodeAddr> {
        let mut undelivered = Vec::new();
        for node in nodes {
            let mut attempt = 0;
            loop {
                let result = sessions.session(node).and_then(|session| match decision {
                    Decision::Commit { version } => session.commit(&txn_id, version),
                    Decision::Abort => session.abort(&txn_id),
                });
                match result {
                    Ok(()) => break,
                    Err(e) => {
                        sessions.report_failure(node, &e);
                        if attempt >= self.retry.retries {
                            debug!(txn = %txn_id, node = %node, error = %e, "decision delivery gave up");
                            undelivered.push(node.clone());
                            break;
                        }
                        attempt += 1;
                        warn!(txn = %txn_id, node = %node, attempt, error = %e, "retrying decision delivery");
                        if !self.retry.backoff.is_zero() {
                            thread::sleep(self.retry.backoff);
                        }
                    }
                }
            }
        }
        undelivered
    }

    fn end(&self, txn_id: TxnId) {
        if let Err(e) = self.log.end(txn_id) {
            warn!(txn = %txn_id, error = %e, "cannot log end record");
        }
    }

    /// Re-send the decision of every pending transaction
    ///
    /// Transactions without a logged decision are aborted.
    pub fn resolve_pending(&self, sessions: &dyn SessionSource) -> ResolveReport {
        let mut report = ResolveReport::default();
        for pending in self.log.pending() {
            let decision = pending.resolution();
            let undelivered = self.deliver(pending.txn_id, decision, &pending.participants, sessions);
            if undelivered.is_empty() {
                if pending.decision.is_none() {
                    if let Err(e) = self.log.decide(pending.txn_id, decision, Vec::new()) {
                        warn!(txn = %pending.txn_id, error = %e, "cannot log presumed abort");
                    }
                }
                self.end(pending.txn_id);
                debug!(txn = %pending.txn_id, ?decision, "pending transaction resolved");
                report.resolved += 1;
            } else {
                report.remaining += 1;
            }
        }
        report
    }
}

fn prepare_one(
    sessions: &dyn SessionSource,
    addr: &NodeAddr,
    request: &PrepareRequest,
) -> dtranx_core::Result<Vote> {
    sessions.session(addr)?.prepare(request)
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(DecisionLog::ephemeral(), RetryPolicy::default())
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("log", &self.log)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Keys of the conflicts in a result, for logs and tests
pub fn conflict_keys(result: &ValidationResult) -> Vec<Key> {
    result.conflicts().iter().map(Conflict::key).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{ReadMode, ReadRecord};
    use dtranx_core::{ClientId, ReadReply, Value};
    use dtranx_storage::{NodeConfig, StorageNode};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;

    /// Wraps a node; can be switched to fail every call
    struct Switchable {
        node: Arc<StorageNode>,
        down: AtomicBool,
    }

    impl Switchable {
        fn check(&self) -> dtranx_core::Result<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(dtranx_core::Error::unavailable(
                    &NodeAddr::from("down"),
                    "switched off",
                ))
            } else {
                Ok(())
            }
        }
    }

    impl NodeSession for Switchable {
        fn get(&self, key: &Key) -> dtranx_core::Result<ReadReply> {
            self.check()?;
            Ok(self.node.get(key))
        }
        fn snapshot_timestamp(&self) -> dtranx_core::Result<Version> {
            self.check()?;
            Ok(self.node.snapshot_timestamp())
        }
        fn get_at(&self, key: &Key, ts: Version) -> dtranx_core::Result<ReadReply> {
            self.check()?;
            Ok(self.node.get_at(key, ts))
        }
        fn prepare(&self, req: &PrepareRequest) -> dtranx_core::Result<Vote> {
            self.check()?;
            Ok(self.node.prepare(req))
        }
        fn commit(&self, txn: &TxnId, v: Version) -> dtranx_core::Result<()> {
            self.check()?;
            self.node.commit(txn, v);
            Ok(())
        }
        fn abort(&self, txn: &TxnId) -> dtranx_core::Result<()> {
            self.check()?;
            self.node.abort(txn);
            Ok(())
        }
    }

    struct Cluster {
        nodes: BTreeMap<NodeAddr, Arc<Switchable>>,
        failures: Mutex<Vec<NodeAddr>>,
    }

    impl Cluster {
        fn new() -> Self {
            let nodes = ["n1:1", "n2:1"]
                .iter()
                .map(|addr| {
                    (
                        NodeAddr::from(*addr),
                        Arc::new(Switchable {
                            node: Arc::new(StorageNode::new(NodeConfig::default())),
                            down: AtomicBool::new(false),
                        }),
                    )
                })
                .collect();
            Self {
                nodes,
                failures: Mutex::new(Vec::new()),
            }
        }

        fn node(&self, addr: &str) -> &StorageNode {
            &self.nodes[&NodeAddr::from(addr)].node
        }

        fn set_down(&self, addr: &str, down: bool) {
            self.nodes[&NodeAddr::from(addr)]
                .down
                .store(down, Ordering::SeqCst);
        }
    }

    impl SessionSource for Cluster {
        fn session(&self, node: &NodeAddr) -> dtranx_core::Result<Arc<dyn NodeSession>> {
            self.nodes
                .get(node)
                .map(|s| Arc::clone(s) as Arc<dyn NodeSession>)
                .ok_or_else(|| dtranx_core::Error::unavailable(node, "unknown"))
        }

        fn report_failure(&self, node: &NodeAddr, _error: &dtranx_core::Error) {
            self.failures.lock().push(node.clone());
        }
    }

    fn locate(key: &Key) -> NodeAddr {
        if key.as_bytes().first().map(|b| *b <= b'm').unwrap_or(true) {
            NodeAddr::from("n1:1")
        } else {
            NodeAddr::from("n2:1")
        }
    }

    fn ctx(seq: u64) -> TransactionContext {
        TransactionContext::new(TxnId::new(ClientId::from_bytes([4u8; 16]), seq))
    }

    fn manager() -> TransactionManager {
        TransactionManager::new(DecisionLog::ephemeral(), RetryPolicy::none())
    }

    fn current_read(cluster: &Cluster, key: &str) -> ReadRecord {
        let key = Key::from(key);
        match cluster.node(locate(&key).as_str()).get(&key) {
            ReadReply::Found { value, version } => ReadRecord {
                key,
                value,
                version,
                mode: ReadMode::Current,
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    fn seed(manager: &TransactionManager, cluster: &Cluster, seq: u64, pairs: &[(&str, &str)]) {
        let mut c = ctx(1000 + seq);
        for (k, v) in pairs {
            c.buffer_write(Key::from(*k), Value::from(*v)).unwrap();
        }
        manager.commit(&mut c, cluster, locate).unwrap();
    }

    #[test]
    fn test_cross_partition_commit_is_atomic() {
        let cluster = Cluster::new();
        let manager = manager();
        let mut c = ctx(1);
        c.buffer_write(Key::from("a"), Value::from("1")).unwrap();
        c.buffer_write(Key::from("z"), Value::from("2")).unwrap();

        let outcome = manager.commit(&mut c, &cluster, locate).unwrap();
        let version = outcome.version.unwrap();
        assert!(c.is_committed());
        assert_eq!(outcome.participants, 2);
        assert!(outcome.undelivered.is_empty());

        for (addr, key) in [("n1:1", "a"), ("n2:1", "z")] {
            match cluster.node(addr).get(&Key::from(key)) {
                ReadReply::Found { version: v, .. } => assert_eq!(v, version),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(manager.log().pending_count(), 0);
        assert_eq!(manager.metrics().committed, 1);
    }

    #[test]
    fn test_stale_read_aborts_and_releases_locks() {
        let cluster = Cluster::new();
        let manager = manager();
        seed(&manager, &cluster, 1, &[("a", "0"), ("z", "0")]);

        let mut t1 = ctx(1);
        t1.record_read(current_read(&cluster, "a")).unwrap();
        t1.buffer_write(Key::from("z"), Value::from("t1")).unwrap();

        // A concurrent writer changes 'a' first
        seed(&manager, &cluster, 2, &[("a", "other")]);

        let err = manager.commit(&mut t1, &cluster, locate).unwrap_err();
        match err {
            CommitError::Conflict(result) => {
                assert_eq!(conflict_keys(&result), vec![Key::from("a")]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(t1.is_aborted());
        assert_eq!(cluster.node("n2:1").stats().locked_keys, 0);
        match cluster.node("n2:1").get(&Key::from("z")) {
            ReadReply::Found { value, .. } => assert_eq!(value, Value::from("0")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_read_only_commit_sends_no_decision() {
        let cluster = Cluster::new();
        let manager = manager();
        seed(&manager, &cluster, 1, &[("a", "0")]);

        let mut c = ctx(1);
        c.record_read(current_read(&cluster, "a")).unwrap();
        let outcome = manager.commit(&mut c, &cluster, locate).unwrap();
        assert!(outcome.is_read_only());
        assert_eq!(outcome.participants, 1);
        assert_eq!(manager.metrics().read_only, 1);
    }

    #[test]
    fn test_empty_transaction_commits() {
        let cluster = Cluster::new();
        let manager = manager();
        let mut c = ctx(1);
        let outcome = manager.commit(&mut c, &cluster, locate).unwrap();
        assert!(outcome.is_read_only());
        assert_eq!(outcome.participants, 0);
    }

    #[test]
    fn test_commit_twice_is_closed() {
        let cluster = Cluster::new();
        let manager = manager();
        let mut c = ctx(1);
        manager.commit(&mut c, &cluster, locate).unwrap();
        let err = manager.commit(&mut c, &cluster, locate).unwrap_err();
        assert!(matches!(err, CommitError::TransactionClosed(_)));
    }

    #[test]
    fn test_unreachable_participant_aborts_everything() {
        let cluster = Cluster::new();
        let manager = manager();
        cluster.set_down("n2:1", true);

        let mut c = ctx(1);
        c.buffer_write(Key::from("a"), Value::from("1")).unwrap();
        c.buffer_write(Key::from("z"), Value::from("1")).unwrap();
        let err = manager.commit(&mut c, &cluster, locate).unwrap_err();

        assert!(matches!(err, CommitError::Io(_)));
        assert_eq!(cluster.node("n1:1").get(&Key::from("a")), ReadReply::NotFound);
        assert_eq!(cluster.node("n1:1").stats().locked_keys, 0);
        assert!(cluster.failures.lock().contains(&NodeAddr::from("n2:1")));
        // Abort could not reach n2; presumed abort keeps it pending
        assert_eq!(manager.log().pending_count(), 1);

        cluster.set_down("n2:1", false);
        let report = manager.resolve_pending(&cluster);
        assert_eq!(report.resolved, 1);
        assert_eq!(manager.log().pending_count(), 0);
    }

    #[test]
    fn test_undelivered_commit_is_redriven() {
        let cluster = Cluster::new();
        let manager = manager();

        // Prepare succeeds everywhere, then n2 drops before phase two
        let mut c = ctx(1);
        c.buffer_write(Key::from("a"), Value::from("1")).unwrap();
        c.buffer_write(Key::from("z"), Value::from("1")).unwrap();
        let plan = plan_commit(&c, locate).unwrap();
        c.mark_committing().unwrap();
        manager.log().begin(c.txn_id(), plan.locking_participants()).unwrap();
        let prepared = match manager.prepare_all(&plan, &cluster) {
            PrepareRound::Accepted { prepared } => prepared,
            _ => panic!("prepare should succeed"),
        };
        cluster.set_down("n2:1", true);

        let outcome = manager.finish_commit(&mut c, &cluster, &plan, prepared).unwrap();
        assert_eq!(outcome.undelivered, vec![NodeAddr::from("n2:1")]);
        assert!(c.is_committed());
        assert_eq!(cluster.node("n2:1").in_doubt().len(), 1);

        // Still down: nothing resolved
        assert_eq!(manager.resolve_pending(&cluster).remaining, 1);

        cluster.set_down("n2:1", false);
        assert_eq!(manager.resolve_pending(&cluster).resolved, 1);
        match cluster.node("n2:1").get(&Key::from("z")) {
            ReadReply::Found { version, .. } => assert_eq!(Some(version), outcome.version),
            other => panic!("unexpected {:?}", other),
        }
        assert!(cluster.node("n2:1").in_doubt().is_empty());
    }

    #[test]
    fn test_presumed_abort_after_coordinator_restart() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("decisions.log");
        let cluster = Cluster::new();
        let txn_id = TxnId::new(ClientId::from_bytes([9u8; 16]), 1);

        {
            // Coordinator logs Begin, prepares n1, then dies
            let log = DecisionLog::open(&path, dtranx_durability::DurabilityMode::Strict).unwrap();
            log.begin(txn_id, vec![NodeAddr::from("n1:1")]).unwrap();
            let mut req = PrepareRequest::new(txn_id);
            req.writes.push((Key::from("a"), Value::from("lost")));
            assert!(cluster.node("n1:1").prepare(&req).is_yes());
        }

        let log = DecisionLog::open(&path, dtranx_durability::DurabilityMode::Strict).unwrap();
        let manager = TransactionManager::new(log, RetryPolicy::none());
        let report = manager.resolve_pending(&cluster);
        assert_eq!(report.resolved, 1);
        assert_eq!(cluster.node("n1:1").stats().locked_keys, 0);
        assert_eq!(cluster.node("n1:1").get(&Key::from("a")), ReadReply::NotFound);
    }

    #[test]
    fn test_commit_version_is_max_of_proposals() {
        let cluster = Cluster::new();
        let manager = manager();
        // Push n2's clock far ahead
        cluster.node("n2:1").get_at(&Key::from("x"), Version::new(500));

        let mut c = ctx(1);
        c.buffer_write(Key::from("a"), Value::from("1")).unwrap();
        c.buffer_write(Key::from("z"), Value::from("1")).unwrap();
        let outcome = manager.commit(&mut c, &cluster, locate).unwrap();
        assert_eq!(outcome.version, Some(Version::new(501)));
        assert_eq!(cluster.node("n1:1").clock(), Version::new(501));
    }

    static_assertions::assert_impl_all!(TransactionManager: Send, Sync);
}
