//! Consistent-hash ring with virtual nodes.
//!
//! Each physical node contributes a fixed number of tokens placed at
//! `md5("{id}#{index}")`, and keys map to the first token at or after
//! their own hash, wrapping around the ring. Replica selection walks
//! clockwise collecting distinct, ALIVE physical nodes, so placement
//! stays stable while nodes churn in and out of suspicion.

use membership::{Node, NodeId, NodeStatus};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid ring configuration: {0}")]
    InvalidConfig(&'static str),
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct RingConfig {
    /// Tokens placed on the ring per physical node. Values of 128 or
    /// more give acceptable load variance; 256 is the default.
    pub virtual_nodes: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self { virtual_nodes: 256 }
    }
}

impl RingConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.virtual_nodes == 0 {
            return Err(Error::InvalidConfig("virtual_nodes must be at least 1"));
        }
        Ok(())
    }
}

/// A single token: one placement of a physical node on the ring.
#[derive(Clone, Debug, PartialEq, Eq)]
struct VirtualNode {
    node_id: NodeId,
    index: u32,
}

/// Hash a ring position: the first eight bytes of the MD5 digest,
/// big-endian. The bit pattern is kept as a signed value, so ordering
/// matches deployments which compare tokens as signed 64-bit integers.
fn hash_position(position: &str) -> i64 {
    let digest = md5::compute(position.as_bytes());
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.0[..8]);
    i64::from_be_bytes(word)
}

#[derive(Default)]
struct RingInner {
    tokens: BTreeMap<i64, VirtualNode>,
    nodes: HashMap<NodeId, Node>,
}

/// Counts reported by [`HashRing::stats`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingStats {
    pub physical_nodes: usize,
    pub virtual_nodes: usize,
    pub tokens_per_node: BTreeMap<NodeId, usize>,
}

/// The ring itself: an ordered token map plus a registry of physical
/// nodes, guarded by a read-write lock. Reads never block reads; only
/// membership changes take the write lock.
pub struct HashRing {
    virtual_nodes: u32,
    inner: RwLock<RingInner>,
}

impl HashRing {
    pub fn new(config: RingConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            virtual_nodes: config.virtual_nodes,
            inner: RwLock::new(RingInner::default()),
        })
    }

    /// Add `node`, placing its tokens. Adding a node already present
    /// (by id) is a no-op.
    pub fn add_node(&self, node: Node) {
        let mut inner = self.inner.write().unwrap();
        if inner.nodes.contains_key(&node.id) {
            return;
        }
        for index in 0..self.virtual_nodes {
            let token = hash_position(&format!("{}#{}", node.id, index));
            inner.tokens.insert(
                token,
                VirtualNode {
                    node_id: node.id.clone(),
                    index,
                },
            );
        }
        tracing::debug!(node = %node, tokens = self.virtual_nodes, "added node to ring");
        inner.nodes.insert(node.id.clone(), node);
    }

    /// Remove a node and every token it placed.
    pub fn remove_node(&self, id: &NodeId) {
        let mut inner = self.inner.write().unwrap();
        if inner.nodes.remove(id).is_none() {
            return;
        }
        inner.tokens.retain(|_, vnode| vnode.node_id != *id);
        tracing::debug!(node = %id, "removed node from ring");
    }

    /// Update the recorded status of a node. Returns false if the node
    /// is not on the ring.
    pub fn set_status(&self, id: &NodeId, status: NodeStatus) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.nodes.get_mut(id) {
            Some(node) => {
                node.status = status;
                true
            }
            None => false,
        }
    }

    /// The primary owner of `key`: the physical node of the first token
    /// at or after the key's hash, wrapping to the ring start.
    pub fn get_node(&self, key: &str) -> Option<Node> {
        let inner = self.inner.read().unwrap();
        let hash = hash_position(key);
        let vnode = inner
            .tokens
            .range(hash..)
            .next()
            .or_else(|| inner.tokens.iter().next())
            .map(|(_, vnode)| vnode)?;
        inner.nodes.get(&vnode.node_id).cloned()
    }

    /// The ordered replica set for `key`: up to `rf` distinct physical
    /// nodes with status ALIVE, in clockwise token order. Non-alive
    /// nodes are skipped but counted as seen, so the walk terminates
    /// once every physical node has been considered.
    pub fn get_replica_nodes(&self, key: &str, rf: usize) -> Vec<Node> {
        if rf == 0 {
            return Vec::new();
        }
        let inner = self.inner.read().unwrap();
        if inner.tokens.is_empty() {
            return Vec::new();
        }

        let hash = hash_position(key);
        let mut replicas = Vec::with_capacity(rf.min(inner.nodes.len()));
        let mut seen: HashSet<&NodeId> = HashSet::with_capacity(inner.nodes.len());

        let clockwise = inner
            .tokens
            .range(hash..)
            .chain(inner.tokens.range(..hash));
        for (_, vnode) in clockwise {
            if !seen.insert(&vnode.node_id) {
                continue;
            }
            if let Some(node) = inner.nodes.get(&vnode.node_id) {
                if node.status.is_alive() {
                    replicas.push(node.clone());
                    if replicas.len() == rf {
                        break;
                    }
                }
            }
            if seen.len() == inner.nodes.len() {
                break;
            }
        }
        replicas
    }

    pub fn get_all_nodes(&self) -> HashSet<Node> {
        let inner = self.inner.read().unwrap();
        inner.nodes.values().cloned().collect()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.inner.read().unwrap().nodes.contains_key(id)
    }

    /// Number of physical nodes on the ring.
    pub fn size(&self) -> u32 {
        self.inner.read().unwrap().nodes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().nodes.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.tokens.clear();
        inner.nodes.clear();
    }

    pub fn stats(&self) -> RingStats {
        let inner = self.inner.read().unwrap();
        let mut tokens_per_node: BTreeMap<NodeId, usize> = BTreeMap::new();
        for vnode in inner.tokens.values() {
            *tokens_per_node.entry(vnode.node_id.clone()).or_default() += 1;
        }
        RingStats {
            physical_nodes: inner.nodes.len(),
            virtual_nodes: inner.tokens.len(),
            tokens_per_node,
        }
    }
}

impl std::fmt::Debug for HashRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("HashRing")
            .field("virtual_nodes_per_node", &self.virtual_nodes)
            .field("physical_nodes", &stats.physical_nodes)
            .field("tokens", &stats.virtual_nodes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, port: u16) -> Node {
        Node::new(id, format!("127.0.0.1:{port}").parse().unwrap())
    }

    fn ring_with(virtual_nodes: u32, nodes: &[Node]) -> HashRing {
        let ring = HashRing::new(RingConfig { virtual_nodes }).unwrap();
        for n in nodes {
            ring.add_node(n.clone());
        }
        ring
    }

    fn three_nodes() -> Vec<Node> {
        vec![
            node("n1", 8081),
            node("n2", 8082),
            node("n3", 8083),
        ]
    }

    #[test]
    fn zero_virtual_nodes_is_rejected() {
        assert!(HashRing::new(RingConfig { virtual_nodes: 0 }).is_err());
    }

    #[test]
    fn empty_ring_has_no_owner() {
        let ring = HashRing::new(RingConfig::default()).unwrap();
        assert!(ring.get_node("k").is_none());
        assert!(ring.get_replica_nodes("k", 3).is_empty());
        assert!(ring.is_empty());
    }

    #[test]
    fn lookups_are_deterministic() {
        let ring = ring_with(256, &three_nodes());
        let first = ring.get_node("test-key").unwrap();
        for _ in 0..10 {
            assert_eq!(ring.get_node("test-key").unwrap(), first);
        }
    }

    #[test]
    fn add_node_is_idempotent() {
        let ring = ring_with(256, &three_nodes());
        let stats = ring.stats();
        ring.add_node(node("n1", 8081));
        assert_eq!(ring.stats(), stats);
        assert_eq!(ring.stats().virtual_nodes, 3 * 256);
    }

    #[test]
    fn remove_node_clears_all_its_tokens() {
        let ring = ring_with(256, &three_nodes());
        ring.remove_node(&"n2".into());
        let stats = ring.stats();
        assert_eq!(stats.physical_nodes, 2);
        assert_eq!(stats.virtual_nodes, 2 * 256);
        assert!(!stats.tokens_per_node.contains_key(&"n2".into()));
    }

    #[test]
    fn replica_sets_are_distinct_alive_and_bounded() {
        let ring = ring_with(256, &three_nodes());
        for key in ["a", "b", "test-key", "user:123"] {
            let replicas = ring.get_replica_nodes(key, 3);
            assert_eq!(replicas.len(), 3);
            let ids: HashSet<_> = replicas.iter().map(|n| n.id.clone()).collect();
            assert_eq!(ids.len(), 3);
            assert!(replicas.iter().all(|n| n.status.is_alive()));

            assert!(ring.get_replica_nodes(key, 2).len() == 2);
            assert!(ring.get_replica_nodes(key, 10).len() == 3);
            assert!(ring.get_replica_nodes(key, 0).is_empty());
        }
    }

    #[test]
    fn non_alive_nodes_are_skipped_in_clockwise_order() {
        let ring = ring_with(256, &three_nodes());
        let full = ring.get_replica_nodes("test-key", 3);
        assert_eq!(full.len(), 3);

        let down = full[1].id.clone();
        ring.set_status(&down, NodeStatus::Down);

        let remaining = ring.get_replica_nodes("test-key", 3);
        let expected: Vec<_> = full.iter().filter(|n| n.id != down).cloned().collect();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn all_nodes_down_yields_an_empty_replica_set() {
        let ring = ring_with(256, &three_nodes());
        for n in three_nodes() {
            ring.set_status(&n.id, NodeStatus::Down);
        }
        assert!(ring.get_replica_nodes("test-key", 3).is_empty());
        // get_node does not filter by status.
        assert!(ring.get_node("test-key").is_some());
    }

    #[test]
    fn removing_a_non_owning_node_does_not_move_keys() {
        let ring = ring_with(256, &three_nodes());
        let keys: Vec<String> = (0..200).map(|i| format!("key-{i}")).collect();
        let owners: Vec<Node> = keys.iter().map(|k| ring.get_node(k).unwrap()).collect();

        ring.remove_node(&"n3".into());
        for (key, owner) in keys.iter().zip(&owners) {
            if owner.id != "n3".into() {
                assert_eq!(&ring.get_node(key).unwrap(), owner, "{key} moved");
            }
        }
    }

    #[test]
    fn more_virtual_nodes_balance_load_better() {
        fn load_variance(virtual_nodes: u32) -> f64 {
            let ring = ring_with(virtual_nodes, &three_nodes());
            let mut counts: HashMap<NodeId, usize> = HashMap::new();
            for i in 0..1_000 {
                let owner = ring.get_node(&format!("synthetic-key-{i}")).unwrap();
                *counts.entry(owner.id).or_default() += 1;
            }
            let mean = 1_000.0 / 3.0;
            counts
                .values()
                .map(|&c| (c as f64 - mean).powi(2))
                .sum::<f64>()
                / 3.0
        }

        assert!(load_variance(256) < load_variance(1));
    }
}
