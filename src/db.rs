//! Benchmark-facing adapter.
//!
//! [`DtranxDb`] turns batched key-value operations into single
//! transactions: every read runs first, then every write is buffered, then
//! one commit covers the whole batch. Each call leaves the coordinator
//! cleared, whatever the outcome.

use crate::error::Result;
use dtranx_client::{ClientConfig, ClientTranx, Connector};
use dtranx_concurrency::{CommitOutcome, ManagerMetrics};
use dtranx_core::{Key, NodeAddr, NodeSession, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Outcome of an adapter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Every read succeeded and the commit went through
    Ok,
    /// A read target was missing or unreachable, or the snapshot could not
    /// be served; nothing was committed
    ErrorNoData,
    /// Commit failed; nothing was applied
    ErrorConflict,
}

impl Status {
    /// Integer code used by the benchmark driver
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::ErrorNoData => 1,
            Status::ErrorConflict => 2,
        }
    }

    /// Check if the operation succeeded
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// Collapse a detailed result
    ///
    /// Read-phase failures become `ErrorNoData`; everything else that
    /// prevented the commit becomes `ErrorConflict`.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) if e.is_read_failure() => Status::ErrorNoData,
            Err(_) => Status::ErrorConflict,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "OK",
            Status::ErrorNoData => "ERROR_NO_DATA",
            Status::ErrorConflict => "ERROR_CONFLICT",
        };
        f.write_str(s)
    }
}

/// One batched transaction
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// Keys read before any write
    pub reads: &'a [Key],
    /// Read at the transaction's snapshot instead of the latest version
    pub snapshot: bool,
    /// Writes buffered after the reads
    pub writes: &'a [(Key, Value)],
}

impl<'a> Batch<'a> {
    /// Batch reading `keys`
    pub fn read(keys: &'a [Key]) -> Self {
        Self {
            reads: keys,
            snapshot: false,
            writes: &[],
        }
    }

    /// Batch writing `pairs`
    pub fn write(pairs: &'a [(Key, Value)]) -> Self {
        Self {
            reads: &[],
            snapshot: false,
            writes: pairs,
        }
    }

    /// Read in snapshot mode
    pub fn snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }

    /// Also buffer `pairs` after the reads
    pub fn with_writes(mut self, pairs: &'a [(Key, Value)]) -> Self {
        self.writes = pairs;
        self
    }
}

/// Values read by a committed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// One value per read key, in request order
    pub values: Vec<Value>,
    /// Commit details
    pub outcome: CommitOutcome,
}

/// Transactional key-value adapter over one coordinator.
///
/// Safe to share between threads: calls are serialized by a mutex around
/// the whole read, write, commit and clear sequence. For parallel load,
/// give each worker its own `DtranxDb`.
///
/// # Example
///
/// ```no_run
/// use dtranx::prelude::*;
///
/// let db = DtranxDb::init(ClientConfig::new().nodes(["10.0.0.1:60000"]))?;
/// let pairs = vec![(Key::from("user:1"), Value::from("alice"))];
/// assert_eq!(db.insert(&pairs), Status::Ok);
/// assert_eq!(db.read(&[Key::from("user:1")]), Status::Ok);
/// db.close();
/// # Ok::<(), dtranx::Error>(())
/// ```
pub struct DtranxDb {
    tranx: Mutex<ClientTranx>,
}

impl DtranxDb {
    /// Adapter talking TCP to the configured nodes.
    pub fn init(config: ClientConfig) -> Result<Self> {
        Ok(Self::from_tranx(ClientTranx::new(config)?))
    }

    /// Adapter using pre-established sessions.
    ///
    /// Nodes without a session are connected over TCP on first use.
    pub fn with_sessions<I>(config: ClientConfig, sessions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeAddr, Arc<dyn NodeSession>)>,
    {
        let tranx = ClientTranx::new(config)?;
        for (addr, session) in sessions {
            tranx.init_session(addr, session)?;
        }
        Ok(Self::from_tranx(tranx))
    }

    /// Adapter opening sessions through `connector`.
    pub fn with_connector(config: ClientConfig, connector: impl Connector + 'static) -> Result<Self> {
        Ok(Self::from_tranx(ClientTranx::with_connector(config, connector)?))
    }

    /// Adapter around an existing coordinator.
    pub fn from_tranx(tranx: ClientTranx) -> Self {
        Self {
            tranx: Mutex::new(tranx),
        }
    }

    /// Read `keys` in one transaction.
    pub fn read(&self, keys: &[Key]) -> Status {
        Status::from_result(&self.execute(Batch::read(keys)))
    }

    /// Read `keys` at one snapshot in one transaction.
    pub fn read_snapshot(&self, keys: &[Key]) -> Status {
        Status::from_result(&self.execute(Batch::read(keys).snapshot()))
    }

    /// Write `pairs` in one transaction.
    pub fn write(&self, pairs: &[(Key, Value)]) -> Status {
        Status::from_result(&self.execute(Batch::write(pairs)))
    }

    /// Read `keys`, then write `pairs`, in one transaction.
    pub fn update(&self, keys: &[Key], pairs: &[(Key, Value)]) -> Status {
        Status::from_result(&self.execute(Batch::read(keys).with_writes(pairs)))
    }

    /// Write `pairs` in one transaction.
    ///
    /// Same as [`write`](Self::write): the store does not distinguish
    /// creating a key from overwriting it.
    pub fn insert(&self, pairs: &[(Key, Value)]) -> Status {
        self.write(pairs)
    }

    /// Run one batch, reporting exactly what happened.
    ///
    /// The first failed read ends the transaction without a commit.
    pub fn execute(&self, batch: Batch<'_>) -> Result<BatchResult> {
        let mut tranx = self.tranx.lock();
        let result = Self::run(&mut tranx, batch);
        tranx.clear();
        if let Err(e) = &result {
            debug!(error = %e, "batch failed");
        }
        result
    }

    fn run(tranx: &mut ClientTranx, batch: Batch<'_>) -> Result<BatchResult> {
        let mut values = Vec::with_capacity(batch.reads.len());
        for key in batch.reads {
            let value = if batch.snapshot {
                tranx.read_snapshot(key)?
            } else {
                tranx.read(key)?
            };
            values.push(value);
        }
        for (key, value) in batch.writes {
            tranx.write(key.clone(), value.clone())?;
        }
        let outcome = tranx.try_commit()?;
        Ok(BatchResult { values, outcome })
    }

    /// Read `keys` and return their values.
    pub fn get(&self, keys: &[Key]) -> Result<Vec<Value>> {
        self.execute(Batch::read(keys)).map(|r| r.values)
    }

    /// Commit counters of the underlying coordinator.
    pub fn metrics(&self) -> ManagerMetrics {
        self.tranx.lock().metrics()
    }

    /// Release every node session.
    ///
    /// Later operations reconnect.
    pub fn close(&self) {
        self.tranx.lock().close();
    }
}

impl fmt::Debug for DtranxDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtranxDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtranx_client::LocalConnector;
    use dtranx_storage::{NodeConfig, StorageNode};

    fn db() -> DtranxDb {
        let addrs = ["n1:1", "n2:1"];
        let connector = LocalConnector::new();
        for addr in addrs {
            connector.add(addr, Arc::new(StorageNode::new(NodeConfig::default())));
        }
        DtranxDb::with_connector(ClientConfig::new().nodes(addrs), connector).unwrap()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(Key, Value)> {
        items
            .iter()
            .map(|(k, v)| (Key::from(*k), Value::from(*v)))
            .collect()
    }

    fn keys(items: &[&str]) -> Vec<Key> {
        items.iter().map(|k| Key::from(*k)).collect()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::ErrorNoData.code(), 1);
        assert_eq!(Status::ErrorConflict.code(), 2);
        assert_eq!(Status::ErrorNoData.to_string(), "ERROR_NO_DATA");
    }

    #[test]
    fn test_insert_then_read() {
        let db = db();
        assert_eq!(db.insert(&pairs(&[("a", "1"), ("b", "2"), ("c", "3")])), Status::Ok);
        assert_eq!(db.read(&keys(&["a", "b", "c"])), Status::Ok);
        assert_eq!(
            db.get(&keys(&["c", "a"])).unwrap(),
            vec![Value::from("3"), Value::from("1")]
        );
    }

    #[test]
    fn test_missing_key_is_no_data_and_skips_writes() {
        let db = db();
        let status = db.update(&keys(&["missing"]), &pairs(&[("x", "1")]));
        assert_eq!(status, Status::ErrorNoData);
        assert_eq!(db.read(&keys(&["x"])), Status::ErrorNoData);
        assert_eq!(db.metrics().committed, 0);
    }

    #[test]
    fn test_update_reads_and_writes_together() {
        let db = db();
        assert!(db.insert(&pairs(&[("a", "1")])).is_ok());
        assert_eq!(db.update(&keys(&["a"]), &pairs(&[("a", "2"), ("b", "2")])), Status::Ok);
        assert_eq!(
            db.get(&keys(&["a", "b"])).unwrap(),
            vec![Value::from("2"), Value::from("2")]
        );
    }

    #[test]
    fn test_read_snapshot() {
        let db = db();
        assert!(db.insert(&pairs(&[("a", "1"), ("b", "2")])).is_ok());
        assert_eq!(db.read_snapshot(&keys(&["a", "b"])), Status::Ok);
        assert_eq!(db.read_snapshot(&keys(&["zzz"])), Status::ErrorNoData);
    }

    #[test]
    fn test_execute_reports_cause() {
        let db = db();
        let err = db.execute(Batch::read(&keys(&["nope"]))).unwrap_err();
        assert!(err.is_not_found());

        let result = db.execute(Batch::write(&pairs(&[("k", "v")]))).unwrap();
        assert!(result.values.is_empty());
        assert!(result.outcome.version.is_some());
    }

    #[test]
    fn test_empty_batch_is_ok() {
        let db = db();
        assert_eq!(db.read(&[]), Status::Ok);
        assert_eq!(db.write(&[]), Status::Ok);
    }

    #[test]
    fn test_close_then_reuse() {
        let db = db();
        assert!(db.insert(&pairs(&[("a", "1")])).is_ok());
        db.close();
        assert_eq!(db.read(&keys(&["a"])), Status::Ok);
    }

    static_assertions::assert_impl_all!(DtranxDb: Send, Sync);
}
