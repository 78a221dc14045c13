//! Core types for the transaction client
//!
//! This module defines the fundamental types used throughout the system:
//! - [`Key`] / [`Value`]: opaque byte strings stored by the nodes
//! - [`Version`]: monotonic marker attached to every stored value
//! - [`NodeAddr`]: address of one storage node (one partition)
//! - [`ClientId`] / [`TxnId`]: globally unique transaction identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Opaque key identifying one entry in the store
///
/// Keys are arbitrary bytes. Every key maps to exactly one partition,
/// see the partition locator in the client crate.
///
/// # Examples
///
/// ```
/// use dtranx_core::Key;
///
/// let key = Key::from("user:1");
/// assert_eq!(key.as_bytes(), b"user:1");
/// assert_eq!(key.to_string(), "user:1");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the key and return its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length of the key in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s.into_bytes())
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key(bytes)
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key(bytes.to_vec())
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// Opaque payload associated with a key at a point in time
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Value(Vec<u8>);

impl Value {
    /// Create a value from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Value(bytes.into())
    }

    /// Raw value bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the value and return its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// View the value as UTF-8, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Length of the value in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value(s.into_bytes())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value(bytes.to_vec())
    }
}

/// Monotonic version marker
///
/// Versions are commit timestamps drawn from the storage nodes' logical
/// clocks. A key's version strictly increases with every committed write.
/// [`Version::ZERO`] is never assigned to a stored value and stands for
/// "key absent" in validation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// The version of a key that does not exist
    pub const ZERO: Version = Version(0);

    /// Wrap a raw counter value
    pub const fn new(raw: u64) -> Self {
        Version(raw)
    }

    /// Raw counter value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The next version after this one
    pub fn next(self) -> Self {
        Version(self.0.saturating_add(1))
    }

    /// Check if this is [`Version::ZERO`]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Network address of a storage node
///
/// Kept as the configured `host:port` string so that hostnames are resolved
/// at connect time and the partition ring hashes the same text on every
/// client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddr(String);

impl NodeAddr {
    /// Create a node address
    pub fn new(addr: impl Into<String>) -> Self {
        NodeAddr(addr.into())
    }

    /// The address as configured
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddr {
    fn from(s: &str) -> Self {
        NodeAddr(s.to_string())
    }
}

impl From<String> for NodeAddr {
    fn from(s: String) -> Self {
        NodeAddr(s)
    }
}

impl From<SocketAddr> for NodeAddr {
    fn from(addr: SocketAddr) -> Self {
        NodeAddr(addr.to_string())
    }
}

/// Unique identifier of one coordinator instance
///
/// # Examples
///
/// ```
/// use dtranx_core::ClientId;
///
/// let a = ClientId::new();
/// let b = ClientId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Create a new random ClientId using UUID v4
    pub fn new() -> Self {
        ClientId(Uuid::new_v4())
    }

    /// Create a ClientId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        ClientId(Uuid::from_bytes(bytes))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier
///
/// Unique across all coordinators: the issuing client's id plus a
/// per-client sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId {
    /// Coordinator that issued the transaction
    pub client: ClientId,
    /// Sequence number within that coordinator
    pub seq: u64,
}

impl TxnId {
    /// Create a transaction id
    pub fn new(client: ClientId, seq: u64) -> Self {
        TxnId { client, seq }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.seq)
    }
}
