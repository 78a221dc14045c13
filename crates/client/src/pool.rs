//! Node session pool
//!
//! One session per node, created on first use and cached for the lifetime
//! of the coordinator. Sessions registered up front with
//! [`SessionPool::insert`] are pinned: a failure never evicts them, since
//! the pool has no way to recreate them.

use dashmap::DashMap;
use dtranx_concurrency::SessionSource;
use dtranx_core::{Error, NodeAddr, NodeSession, Result};
use dtranx_storage::StorageNode;
use dtranx_wire::{SessionOptions, TcpSession};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens sessions to nodes
pub trait Connector: Send + Sync {
    /// Open a new session to `addr`
    ///
    /// Failures must be retryable errors ([`Error::Unavailable`],
    /// [`Error::Timeout`] or [`Error::Io`]).
    fn connect(&self, addr: &NodeAddr) -> Result<Arc<dyn NodeSession>>;
}

/// Connects over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    options: SessionOptions,
}

impl TcpConnector {
    /// Connector using `options` for every session
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, addr: &NodeAddr) -> Result<Arc<dyn NodeSession>> {
        let session = TcpSession::connect(addr.clone(), self.options)?;
        Ok(Arc::new(session))
    }
}

/// Connects to in-process storage nodes
///
/// # Example
///
/// ```
/// use dtranx_client::{Connector, LocalConnector};
/// use dtranx_core::NodeAddr;
/// use dtranx_storage::{NodeConfig, StorageNode};
/// use std::sync::Arc;
///
/// let node = Arc::new(StorageNode::new(NodeConfig::default()));
/// let connector = LocalConnector::new().with_node("n1:1", node);
/// assert!(connector.connect(&NodeAddr::from("n1:1")).is_ok());
/// assert!(connector.connect(&NodeAddr::from("n2:1")).is_err());
/// ```
#[derive(Default)]
pub struct LocalConnector {
    nodes: DashMap<NodeAddr, Arc<StorageNode>>,
}

impl LocalConnector {
    /// Connector without nodes
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under `addr`
    pub fn with_node(self, addr: impl Into<NodeAddr>, node: Arc<StorageNode>) -> Self {
        self.nodes.insert(addr.into(), node);
        self
    }

    /// Register a node under `addr`
    pub fn add(&self, addr: impl Into<NodeAddr>, node: Arc<StorageNode>) {
        self.nodes.insert(addr.into(), node);
    }
}

impl Connector for LocalConnector {
    fn connect(&self, addr: &NodeAddr) -> Result<Arc<dyn NodeSession>> {
        self.nodes
            .get(addr)
            .map(|node| Arc::clone(node.value()) as Arc<dyn NodeSession>)
            .ok_or_else(|| Error::unavailable(addr, "no local node registered"))
    }
}

struct PooledSession {
    session: Arc<dyn NodeSession>,
    pinned: bool,
}

/// Cache of one session per node
pub struct SessionPool {
    connector: Box<dyn Connector>,
    sessions: DashMap<NodeAddr, PooledSession>,
    connects: AtomicU64,
}

impl SessionPool {
    /// Pool opening sessions through `connector`
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            sessions: DashMap::new(),
            connects: AtomicU64::new(0),
        }
    }

    /// Session to `addr`, connecting on first use
    ///
    /// Concurrent first calls may both connect; one session is kept and
    /// the other dropped.
    pub fn acquire(&self, addr: &NodeAddr) -> Result<Arc<dyn NodeSession>> {
        if let Some(pooled) = self.sessions.get(addr) {
            return Ok(Arc::clone(&pooled.session));
        }

        let session = self.connector.connect(addr)?;
        self.connects.fetch_add(1, Ordering::Relaxed);
        debug!(node = %addr, "session opened");

        let pooled = self
            .sessions
            .entry(addr.clone())
            .or_insert(PooledSession {
                session,
                pinned: false,
            });
        Ok(Arc::clone(&pooled.session))
    }

    /// Register an established session; it is never evicted
    pub fn insert(&self, addr: NodeAddr, session: Arc<dyn NodeSession>) {
        self.sessions.insert(
            addr,
            PooledSession {
                session,
                pinned: true,
            },
        );
    }

    /// Drop the cached session to `addr` so the next acquire reconnects
    ///
    /// Returns `false` if there was none or it is pinned.
    pub fn evict(&self, addr: &NodeAddr) -> bool {
        self.sessions
            .remove_if(addr, |_, pooled| !pooled.pinned)
            .is_some()
    }

    /// Drop every session, pinned ones included
    pub fn close(&self) {
        let count = self.sessions.len();
        self.sessions.clear();
        debug!(sessions = count, "session pool closed");
    }

    /// Check if a session to `addr` is cached
    pub fn contains(&self, addr: &NodeAddr) -> bool {
        self.sessions.contains_key(addr)
    }

    /// Number of cached sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no session is cached
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Connections opened so far
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }
}

impl SessionSource for SessionPool {
    fn session(&self, node: &NodeAddr) -> Result<Arc<dyn NodeSession>> {
        self.acquire(node)
    }

    fn report_failure(&self, node: &NodeAddr, error: &Error) {
        if error.is_retryable() && self.evict(node) {
            warn!(node = %node, error = %error, "session evicted after failure");
        }
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("sessions", &self.len())
            .field("connects", &self.connect_count())
            .finish()
    }
}
