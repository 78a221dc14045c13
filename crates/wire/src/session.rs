//! Client side of the wire protocol
//!
//! [`TcpSession`] holds one connection to one node and issues one request
//! at a time. Every socket operation carries a timeout, so a dead node
//! turns into [`Error::Timeout`] instead of a hang.
//!
//! After any failure the connection is dropped: the stream may hold half a
//! frame and cannot be trusted. The next request reconnects.

use crate::frame::{read_frame, write_frame, WireError};
use crate::message::{Request, Response};
use dtranx_core::{
    Error, Key, NodeAddr, NodeSession, PrepareRequest, ReadReply, Result, TxnId, Version, Vote,
};
use parking_lot::Mutex;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Socket timeouts for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bound on establishing the connection
    pub connect_timeout: Duration,
    /// Bound on each read and each write of a request
    pub request_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SessionOptions {
    /// Options from millisecond timeouts
    pub fn from_millis(connect_timeout_ms: u64, request_timeout_ms: u64) -> Self {
        Self {
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
        }
    }
}

/// A [`NodeSession`] over TCP
pub struct TcpSession {
    addr: NodeAddr,
    options: SessionOptions,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpSession {
    /// Connect to `addr`
    ///
    /// Fails with [`Error::Unavailable`] or [`Error::Timeout`] if the node
    /// cannot be reached.
    pub fn connect(addr: NodeAddr, options: SessionOptions) -> Result<Self> {
        let stream = open(&addr, &options)?;
        debug!(node = %addr, "session connected");
        Ok(Self {
            addr,
            options,
            stream: Mutex::new(Some(stream)),
        })
    }

    /// Node this session talks to
    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// Check if the session currently holds a live connection
    pub fn is_connected(&self) -> bool {
        self.stream.lock().is_some()
    }

    /// Send one request and wait for its response
    pub fn call(&self, request: &Request) -> Result<Response> {
        let mut guard = self.stream.lock();
        if guard.is_none() {
            debug!(node = %self.addr, "reconnecting session");
            *guard = Some(open(&self.addr, &self.options)?);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(Error::unavailable(&self.addr, "no connection"));
        };

        trace!(node = %self.addr, request = request.name(), "sending");
        let result = write_frame(stream, request).and_then(|_| read_frame::<_, Response>(stream));
        match result {
            Ok(Response::Error(msg)) => Err(Error::Protocol(format!(
                "{} rejected {}: {}",
                self.addr,
                request.name(),
                msg
            ))),
            Ok(response) => Ok(response),
            Err(e) => {
                *guard = None;
                debug!(node = %self.addr, request = request.name(), error = %e, "session broken");
                Err(self.map_error(e))
            }
        }
    }

    fn map_error(&self, err: WireError) -> Error {
        if err.is_timeout() {
            return Error::Timeout {
                node: self.addr.clone(),
                timeout_ms: self.options.request_timeout.as_millis() as u64,
            };
        }
        match err {
            WireError::Closed => Error::unavailable(&self.addr, "connection closed by peer"),
            WireError::Io(e) => Error::unavailable(&self.addr, e.to_string()),
            WireError::Encode(msg) | WireError::Decode(msg) => Error::Serialization(msg),
            other => Error::Protocol(other.to_string()),
        }
    }

    fn unexpected(&self, request: &str, response: Response) -> Error {
        Error::Protocol(format!(
            "{} answered {} with {:?}",
            self.addr, request, response
        ))
    }
}

fn resolve(addr: &NodeAddr) -> Result<SocketAddr> {
    addr.as_str()
        .to_socket_addrs()
        .map_err(|e| Error::unavailable(addr, format!("cannot resolve: {}", e)))?
        .next()
        .ok_or_else(|| Error::unavailable(addr, "address resolved to nothing"))
}

fn open(addr: &NodeAddr, options: &SessionOptions) -> Result<TcpStream> {
    let socket_addr = resolve(addr)?;
    let stream = TcpStream::connect_timeout(&socket_addr, options.connect_timeout).map_err(|e| {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout {
                node: addr.clone(),
                timeout_ms: options.connect_timeout.as_millis() as u64,
            },
            _ => Error::unavailable(addr, e.to_string()),
        }
    })?;
    stream.set_read_timeout(Some(options.request_timeout))?;
    stream.set_write_timeout(Some(options.request_timeout))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

impl std::fmt::Debug for TcpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSession")
            .field("addr", &self.addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl NodeSession for TcpSession {
    fn get(&self, key: &Key) -> Result<ReadReply> {
        match self.call(&Request::Get(key.clone()))? {
            Response::Read(reply) => Ok(reply),
            other => Err(self.unexpected("get", other)),
        }
    }

    fn snapshot_timestamp(&self) -> Result<Version> {
        match self.call(&Request::SnapshotTimestamp)? {
            Response::Timestamp(ts) => Ok(ts),
            other => Err(self.unexpected("snapshot_timestamp", other)),
        }
    }

    fn get_at(&self, key: &Key, timestamp: Version) -> Result<ReadReply> {
        let request = Request::GetAt {
            key: key.clone(),
            timestamp,
        };
        match self.call(&request)? {
            Response::Read(reply) => Ok(reply),
            other => Err(self.unexpected("get_at", other)),
        }
    }

    fn prepare(&self, request: &PrepareRequest) -> Result<Vote> {
        match self.call(&Request::Prepare(request.clone()))? {
            Response::Vote(vote) => Ok(vote),
            other => Err(self.unexpected("prepare", other)),
        }
    }

    fn commit(&self, txn_id: &TxnId, version: Version) -> Result<()> {
        let request = Request::Commit {
            txn_id: *txn_id,
            version,
        };
        match self.call(&request)? {
            Response::Ack => Ok(()),
            other => Err(self.unexpected("commit", other)),
        }
    }

    fn abort(&self, txn_id: &TxnId) -> Result<()> {
        match self.call(&Request::Abort(*txn_id))? {
            Response::Ack => Ok(()),
            other => Err(self.unexpected("abort", other)),
        }
    }

    fn ping(&self) -> Result<()> {
        match self.call(&Request::Ping)? {
            Response::Pong => Ok(()),
            other => Err(self.unexpected("ping", other)),
        }
    }
}
