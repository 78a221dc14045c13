//! Shared helpers for integration tests
//!
//! - [`TestCluster`]: in-process storage nodes plus clients wired to them
//! - [`FlakySession`]: a session that fails selected operations on demand

#![allow(dead_code)]

use dtranx::{
    ClientConfig, ClientTranx, DtranxDb, Key, LocalConnector, NodeAddr, NodeConfig, NodeSession,
    PartitionLocator, StorageNode, TxnId, Value, Version,
};
use dtranx_core::{Error, PrepareRequest, ReadReply, Result, Vote};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Hook = Box<dyn FnOnce() + Send>;

// =============================================================================
// CLUSTER
// =============================================================================

/// In-process cluster of storage nodes
pub struct TestCluster {
    nodes: Vec<(NodeAddr, Arc<StorageNode>)>,
}

impl TestCluster {
    /// `count` empty nodes named `node-0:7000`, `node-1:7000`, ...
    pub fn new(count: usize) -> Self {
        Self::with_node_config(count, NodeConfig::default())
    }

    pub fn with_node_config(count: usize, config: NodeConfig) -> Self {
        let nodes = (0..count)
            .map(|i| {
                (
                    NodeAddr::from(format!("node-{}:7000", i)),
                    Arc::new(StorageNode::new(config.clone())),
                )
            })
            .collect();
        Self { nodes }
    }

    pub fn addrs(&self) -> Vec<NodeAddr> {
        self.nodes.iter().map(|(addr, _)| addr.clone()).collect()
    }

    /// Client configuration without retry delays
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new()
            .nodes(self.addrs())
            .commit_retries(1)
            .retry_backoff(Duration::ZERO)
    }

    pub fn connector(&self) -> LocalConnector {
        let connector = LocalConnector::new();
        for (addr, node) in &self.nodes {
            connector.add(addr.clone(), Arc::clone(node));
        }
        connector
    }

    pub fn client(&self) -> ClientTranx {
        self.client_with(self.config())
    }

    pub fn client_with(&self, config: ClientConfig) -> ClientTranx {
        ClientTranx::with_connector(config, self.connector()).expect("client")
    }

    pub fn db(&self) -> DtranxDb {
        DtranxDb::with_connector(self.config(), self.connector()).expect("db")
    }

    pub fn locator(&self) -> PartitionLocator {
        let config = self.config();
        PartitionLocator::new(config.nodes, config.virtual_nodes).expect("locator")
    }

    pub fn node(&self, addr: &NodeAddr) -> Arc<StorageNode> {
        self.nodes
            .iter()
            .find(|(a, _)| a == addr)
            .map(|(_, node)| Arc::clone(node))
            .expect("unknown node")
    }

    /// Node owning `key`
    pub fn owner(&self, key: &str) -> Arc<StorageNode> {
        self.node(self.locator().locate(&Key::from(key)))
    }

    /// Committed value of `key`, read straight from its node
    pub fn value(&self, key: &str) -> Option<Value> {
        match self.owner(key).get(&Key::from(key)) {
            ReadReply::Found { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Committed version of `key`, zero if absent
    pub fn version(&self, key: &str) -> Version {
        self.owner(key).store().current_version(&Key::from(key))
    }

    /// `count` keys covering as many nodes as possible
    pub fn keys_on_distinct_nodes(&self, count: usize) -> Vec<String> {
        let locator = self.locator();
        let mut used: Vec<NodeAddr> = Vec::new();
        (0..)
            .map(|i| format!("spread:{}", i))
            .filter(|key| {
                let owner = locator.locate(&Key::from(key.as_str()));
                if used.len() < self.nodes.len() && used.contains(owner) {
                    return false;
                }
                used.push(owner.clone());
                true
            })
            .take(count)
            .collect()
    }

    /// Total prepared transactions across nodes
    pub fn in_doubt(&self) -> usize {
        self.nodes.iter().map(|(_, n)| n.in_doubt().len()).sum()
    }

    /// Commit `pairs` with a throwaway client
    pub fn seed(&self, pairs: &[(&str, &str)]) {
        let mut tranx = self.client();
        for (k, v) in pairs {
            tranx.write(Key::from(*k), Value::from(*v)).expect("write");
        }
        assert!(tranx.commit(), "seeding failed");
        tranx.clear();
    }
}

pub fn pairs(items: &[(&str, &str)]) -> Vec<(Key, Value)> {
    items
        .iter()
        .map(|(k, v)| (Key::from(*k), Value::from(*v)))
        .collect()
}

pub fn keys(items: &[&str]) -> Vec<Key> {
    items.iter().map(|k| Key::from(*k)).collect()
}

// =============================================================================
// FAULT INJECTION
// =============================================================================

/// Session over a local node that fails selected operations
///
/// Each switch makes the matching operation return [`Error::Unavailable`]
/// without reaching the node. A hook installed with
/// [`before_prepare`](Self::before_prepare) runs once, just before the next
/// prepare reaches the node.
pub struct FlakySession {
    addr: NodeAddr,
    node: Arc<StorageNode>,
    pub fail_reads: AtomicBool,
    pub fail_prepare: AtomicBool,
    pub fail_commit: AtomicBool,
    /// Remaining commit deliveries to drop before letting them through
    pub drop_commits: AtomicUsize,
    calls: AtomicUsize,
    prepared: AtomicUsize,
    hook: Mutex<Option<Hook>>,
}

impl FlakySession {
    pub fn new(addr: NodeAddr, node: Arc<StorageNode>) -> Arc<Self> {
        Arc::new(Self {
            addr,
            node,
            fail_reads: AtomicBool::new(false),
            fail_prepare: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            drop_commits: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            prepared: AtomicUsize::new(0),
            hook: Mutex::new(None),
        })
    }

    /// Run `hook` before the next prepare is forwarded
    pub fn before_prepare(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    /// Wait until `count` prepares were answered by the node
    ///
    /// Gives up after five seconds and returns `false`.
    pub fn wait_for_prepares(&self, count: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.prepared.load(Ordering::SeqCst) < count {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    /// Requests that reached this session
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if flag.load(Ordering::SeqCst) {
            return Err(Error::unavailable(&self.addr, format!("injected {} failure", op)));
        }
        Ok(())
    }
}

impl NodeSession for FlakySession {
    fn get(&self, key: &Key) -> Result<ReadReply> {
        self.check(&self.fail_reads, "get")?;
        Ok(self.node.get(key))
    }

    fn snapshot_timestamp(&self) -> Result<Version> {
        self.check(&self.fail_reads, "snapshot")?;
        Ok(self.node.snapshot_timestamp())
    }

    fn get_at(&self, key: &Key, timestamp: Version) -> Result<ReadReply> {
        self.check(&self.fail_reads, "get_at")?;
        Ok(self.node.get_at(key, timestamp))
    }

    fn prepare(&self, request: &PrepareRequest) -> Result<Vote> {
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        self.check(&self.fail_prepare, "prepare")?;
        let vote = self.node.prepare(request);
        self.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(vote)
    }

    fn commit(&self, txn_id: &TxnId, version: Version) -> Result<()> {
        self.check(&self.fail_commit, "commit")?;
        let dropped = self
            .drop_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            return Err(Error::unavailable(&self.addr, "commit lost"));
        }
        self.node.commit(txn_id, version);
        Ok(())
    }

    fn abort(&self, txn_id: &TxnId) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.node.abort(txn_id);
        Ok(())
    }
}

/// Client whose session to `addr` is a [`FlakySession`]
pub fn client_with_flaky(cluster: &TestCluster, addr: &NodeAddr) -> (ClientTranx, Arc<FlakySession>) {
    let tranx = cluster.client();
    let flaky = FlakySession::new(addr.clone(), cluster.node(addr));
    tranx
        .init_session(addr.clone(), Arc::clone(&flaky) as Arc<dyn NodeSession>)
        .expect("init session");
    (tranx, flaky)
}
