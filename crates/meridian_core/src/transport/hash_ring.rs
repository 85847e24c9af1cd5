/// Consistent hash ring mapping partition names to owning nodes
use crate::types::NodeId;
use ring::digest::{digest, SHA256};
use std::collections::BTreeMap;

/// Consistent hash ring with virtual nodes.
///
/// Keys hash with SHA-256, so the owner of a key is the same on every
/// process regardless of platform or build.
#[derive(Debug, Clone)]
pub struct HashRing {
    ring: BTreeMap<u64, NodeId>,
    virtual_nodes: usize,
}

impl HashRing {
    pub fn new(virtual_nodes: usize) -> Self {
        Self {
            ring: BTreeMap::new(),
            virtual_nodes: virtual_nodes.max(1),
        }
    }

    /// Builds a ring holding every node in `nodes`.
    pub fn with_nodes<'a>(virtual_nodes: usize, nodes: impl IntoIterator<Item = &'a NodeId>) -> Self {
        let mut ring = Self::new(virtual_nodes);
        for node in nodes {
            ring.add_node(node);
        }
        ring
    }

    pub fn add_node(&mut self, node: &NodeId) {
        for i in 0..self.virtual_nodes {
            let hash = Self::hash_key(&format!("{}:{}", node, i));
            self.ring.insert(hash, node.clone());
        }
    }

    pub fn remove_node(&mut self, node: &NodeId) {
        self.ring.retain(|_, owner| owner != node);
    }

    /// The node owning `key`: first ring entry at or after the key's hash, wrapping.
    pub fn node_for(&self, key: &str) -> Option<&NodeId> {
        let hash = Self::hash_key(key);
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node)
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Distinct nodes on the ring.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.ring.values().cloned().collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    fn hash_key(key: &str) -> u64 {
        let digest = digest(&SHA256, key.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_ref()[..8]);
        u64::from_be_bytes(bytes)
    }
}
