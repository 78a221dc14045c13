//! TCP server for a storage node
//!
//! One thread accepts connections, one thread per connection serves
//! requests in order. Requests on a connection are strictly
//! request/response, so there is no pipelining to reorder.

use crate::frame::{read_frame, write_frame, WireError};
use crate::message::{Request, Response};
use dtranx_storage::StorageNode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Execute one request against the node
pub fn dispatch(node: &StorageNode, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Get(key) => Response::Read(node.get(&key)),
        Request::SnapshotTimestamp => Response::Timestamp(node.snapshot_timestamp()),
        Request::GetAt { key, timestamp } => Response::Read(node.get_at(&key, timestamp)),
        Request::Prepare(req) => Response::Vote(node.prepare(&req)),
        Request::Commit { txn_id, version } => {
            node.commit(&txn_id, version);
            Response::Ack
        }
        Request::Abort(txn_id) => {
            node.abort(&txn_id);
            Response::Ack
        }
    }
}

/// Open connections, kept so shutdown can close them
///
/// A connection leaves the registry when its thread ends.
#[derive(Debug, Default)]
struct Registry {
    next_id: AtomicU64,
    open: Mutex<HashMap<u64, TcpStream>>,
}

type Connections = Arc<Registry>;

impl Registry {
    fn register(&self, stream: &TcpStream) -> io::Result<u64> {
        let clone = stream.try_clone()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.open.lock().insert(id, clone);
        Ok(id)
    }

    fn remove(&self, id: u64) {
        self.open.lock().remove(&id);
    }

    fn close_all(&self) {
        for (_, conn) in self.open.lock().drain() {
            let _ = conn.shutdown(Shutdown::Both);
        }
    }

    fn len(&self) -> usize {
        self.open.lock().len()
    }
}

/// Drops a connection from the registry when its thread ends
struct Registered {
    id: u64,
    registry: Connections,
}

impl Drop for Registered {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// A bound storage node server
pub struct NodeServer {
    listener: TcpListener,
    node: Arc<StorageNode>,
}

impl NodeServer {
    /// Bind to `addr`; use port 0 for an ephemeral port
    pub fn bind(addr: impl ToSocketAddrs, node: Arc<StorageNode>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, node })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Node served
    pub fn node(&self) -> &Arc<StorageNode> {
        &self.node
    }

    /// Serve on the current thread until the process exits
    pub fn serve(self) -> io::Result<()> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "storage node listening");
        let shutdown = Arc::new(AtomicBool::new(false));
        accept_loop(self.listener, self.node, shutdown, Connections::default());
        Ok(())
    }

    /// Serve on a background thread
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Connections::default();

        let thread = {
            let shutdown = Arc::clone(&shutdown);
            let connections = Arc::clone(&connections);
            let listener = self.listener;
            let node = self.node;
            thread::Builder::new()
                .name(format!("dtranx-accept-{}", addr.port()))
                .spawn(move || accept_loop(listener, node, shutdown, connections))?
        };

        info!(addr = %addr, "storage node listening");
        Ok(ServerHandle {
            addr,
            shutdown,
            connections,
            thread: Some(thread),
        })
    }
}

fn accept_loop(
    listener: TcpListener,
    node: Arc<StorageNode>,
    shutdown: Arc<AtomicBool>,
    connections: Connections,
) {
    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let id = match connections.register(&stream) {
            Ok(id) => id,
            Err(e) => {
                warn!(peer = %peer, error = %e, "cannot track connection, dropping it");
                continue;
            }
        };
        let registered = Registered {
            id,
            registry: Arc::clone(&connections),
        };

        let node = Arc::clone(&node);
        let spawned = thread::Builder::new()
            .name("dtranx-conn".to_string())
            .spawn(move || {
                let _registered = registered;
                debug!(peer = %peer, "connection opened");
                match serve_connection(stream, &node) {
                    Ok(()) => debug!(peer = %peer, "connection closed"),
                    Err(e) => debug!(peer = %peer, error = %e, "connection dropped"),
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn connection thread");
        }
    }
}

fn serve_connection(mut stream: TcpStream, node: &StorageNode) -> Result<(), WireError> {
    stream.set_nodelay(true)?;
    loop {
        let request: Request = match read_frame(&mut stream) {
            Ok(r) => r,
            Err(WireError::Closed) => return Ok(()),
            Err(WireError::Decode(msg)) => {
                // The frame was consumed whole, the stream is still in sync
                write_frame(&mut stream, &Response::Error(msg))?;
                continue;
            }
            Err(e) => return Err(e),
        };
        let response = dispatch(node, request);
        write_frame(&mut stream, &response)?;
    }
}

/// Handle to a server running on a background thread
///
/// Dropping the handle shuts the server down.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    connections: Connections,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server listens on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connections currently open
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Stop accepting, close open connections and join the accept thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        // Wake the blocking accept
        let _ = TcpStream::connect(self.addr);
        self.connections.close_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        info!(addr = %self.addr, "storage node stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .field("connections", &self.connections.len())
            .field("stopped", &self.shutdown.load(Ordering::SeqCst))
            .finish()
    }
}
