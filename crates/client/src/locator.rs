//! Partition locator
//!
//! Maps every key to the node that owns it. The partition table is fixed
//! at construction; there is no membership change at runtime.
//!
//! A consistent-hash ring with `virtual_nodes` points per node keeps the
//! key distribution even and makes the mapping independent of the order
//! the nodes were listed in.

use dtranx_core::{Error, Key, NodeAddr, Result};
use std::collections::BTreeSet;
use xxhash_rust::xxh3::xxh3_64;

/// Ring points per node when not configured
pub const DEFAULT_VIRTUAL_NODES: usize = 64;

/// Consistent-hash partition table
#[derive(Debug, Clone)]
pub struct PartitionLocator {
    nodes: Vec<NodeAddr>,
    /// (point, index into `nodes`), sorted by point
    ring: Vec<(u64, usize)>,
}

impl PartitionLocator {
    /// Build the ring
    ///
    /// Fails with [`Error::Config`] for an empty node list, a duplicate
    /// address or zero virtual nodes.
    pub fn new(nodes: Vec<NodeAddr>, virtual_nodes: usize) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::Config("no known partition: node list is empty".into()));
        }
        if virtual_nodes == 0 {
            return Err(Error::Config("virtual_nodes must be at least 1".into()));
        }
        let mut seen = BTreeSet::new();
        for node in &nodes {
            if !seen.insert(node) {
                return Err(Error::Config(format!("duplicate node address {}", node)));
            }
        }

        let mut ring = Vec::with_capacity(nodes.len() * virtual_nodes);
        for (index, node) in nodes.iter().enumerate() {
            for i in 0..virtual_nodes {
                let point = xxh3_64(format!("{}#{}", node, i).as_bytes());
                ring.push((point, index));
            }
        }
        // Ties broken by address so the ring does not depend on input order
        ring.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| nodes[a.1].cmp(&nodes[b.1])));

        Ok(Self { nodes, ring })
    }

    /// Node owning `key`
    pub fn locate(&self, key: &Key) -> &NodeAddr {
        let hash = xxh3_64(key.as_bytes());
        let idx = self.ring.partition_point(|(point, _)| *point < hash);
        let (_, node) = self.ring[idx % self.ring.len()];
        &self.nodes[node]
    }

    /// Every node in the table, in configuration order
    pub fn nodes(&self) -> &[NodeAddr] {
        &self.nodes
    }

    /// Check if `addr` is part of the table
    pub fn contains(&self, addr: &NodeAddr) -> bool {
        self.nodes.contains(addr)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a locator has at least one node
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
