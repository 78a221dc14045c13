//! Sharded versioned storage
//!
//! DashMap keyed by [`Key`], FxHash inside. Each entry is a short chain of
//! committed versions so that snapshot reads can look slightly into the
//! past.
//!
//! # Design
//!
//! - DashMap: sharded internally, reads only lock one shard
//! - FxHash: fast non-crypto hash for opaque byte keys
//! - SmallVec chain: most keys hold a handful of versions, no heap
//!   allocation until the chain grows past four entries
//!
//! Chains are bounded by `max_versions`. When the oldest entry is dropped
//! the chain remembers it was trimmed, which lets [`ShardedStore::get_at`]
//! tell "key did not exist yet" apart from "history no longer available".

use chrono::Utc;
use dashmap::DashMap;
use dtranx_core::{Key, Value, Version};
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::hash::BuildHasherDefault;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// A committed value with its version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    /// Stored value
    pub value: Value,
    /// Commit version
    pub version: Version,
    /// Wall-clock time the version was applied (seconds since epoch)
    pub timestamp: i64,
}

/// Committed versions of one key, oldest first
#[derive(Debug, Clone, Default)]
pub struct VersionChain {
    versions: SmallVec<[VersionedValue; 4]>,
    trimmed: bool,
}

impl VersionChain {
    /// Latest committed version
    pub fn latest(&self) -> Option<&VersionedValue> {
        self.versions.last()
    }

    /// Oldest version still retained
    pub fn oldest(&self) -> Option<&VersionedValue> {
        self.versions.first()
    }

    /// Number of retained versions
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Check if the chain holds no version
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Check if older versions were discarded
    pub fn is_trimmed(&self) -> bool {
        self.trimmed
    }

    fn push(&mut self, value: VersionedValue, max_versions: usize) {
        self.versions.push(value);
        while self.versions.len() > max_versions {
            self.versions.remove(0);
            self.trimmed = true;
        }
    }

    fn lookup(&self, timestamp: Version) -> SnapshotLookup {
        if let Some(vv) = self.versions.iter().rev().find(|vv| vv.version <= timestamp) {
            return SnapshotLookup::Visible(vv.clone());
        }
        match (self.trimmed, self.oldest()) {
            (true, Some(oldest)) => SnapshotLookup::Trimmed {
                oldest_retained: oldest.version,
            },
            _ => SnapshotLookup::Absent,
        }
    }
}

/// Result of a point-in-time lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLookup {
    /// The version visible at the requested timestamp
    Visible(VersionedValue),
    /// The key did not exist at the requested timestamp
    Absent,
    /// The visible version was discarded
    Trimmed {
        /// Oldest version still held
        oldest_retained: Version,
    },
}

/// Sharded storage of version chains
///
/// # Thread Safety
///
/// All operations are thread-safe. Writers only lock the shard holding the
/// key. Atomicity of multi-key batches is the caller's job: the storage
/// node applies batches under its participant lock.
pub struct ShardedStore {
    entries: DashMap<Key, VersionChain, FxBuildHasher>,
    max_versions: usize,
}

impl ShardedStore {
    /// Create a store retaining at most `max_versions` versions per key
    pub fn new(max_versions: usize) -> Self {
        Self {
            entries: DashMap::with_hasher(FxBuildHasher::default()),
            max_versions: max_versions.max(1),
        }
    }

    /// Create with an expected number of keys
    pub fn with_capacity(max_versions: usize, capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()),
            max_versions: max_versions.max(1),
        }
    }

    /// Maximum versions retained per key
    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    /// Latest committed value of a key
    #[inline]
    pub fn get(&self, key: &Key) -> Option<VersionedValue> {
        self.entries
            .get(key)
            .and_then(|chain| chain.latest().cloned())
    }

    /// Value of a key as of `timestamp`
    pub fn get_at(&self, key: &Key, timestamp: Version) -> SnapshotLookup {
        self.entries
            .get(key)
            .map(|chain| chain.lookup(timestamp))
            .unwrap_or(SnapshotLookup::Absent)
    }

    /// Current version of a key, [`Version::ZERO`] if absent
    #[inline]
    pub fn current_version(&self, key: &Key) -> Version {
        self.entries
            .get(key)
            .and_then(|chain| chain.latest().map(|vv| vv.version))
            .unwrap_or(Version::ZERO)
    }

    /// Append a new version for a key
    pub fn put(&self, key: Key, value: Value, version: Version) {
        let versioned = VersionedValue {
            value,
            version,
            timestamp: Utc::now().timestamp(),
        };
        self.entries
            .entry(key)
            .or_default()
            .push(versioned, self.max_versions);
    }

    /// Apply a batch of writes, all at the same version
    pub fn apply_batch(&self, writes: &[(Key, Value)], version: Version) {
        for (key, value) in writes {
            self.put(key.clone(), value.clone(), version);
        }
    }

    /// Check if a key exists
    #[inline]
    pub fn contains(&self, key: &Key) -> bool {
        self.entries
            .get(key)
            .map(|chain| !chain.is_empty())
            .unwrap_or(false)
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of retained versions of a key
    pub fn version_count(&self, key: &Key) -> usize {
        self.entries.get(key).map(|chain| chain.len()).unwrap_or(0)
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for ShardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStore")
            .field("keys", &self.len())
            .field("max_versions", &self.max_versions)
            .finish()
    }
}
