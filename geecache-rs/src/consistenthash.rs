//! Provides a consistent hash ring which maps keys to the nodes owning them.
//!
//! Each real node is placed on the ring multiple times (as **virtual nodes**) so that keys are
//! spread evenly among all nodes. A key belongs to the first virtual node whose hash is greater
//! than or equal to the hash of the key (wrapping around at the end of the ring).
//!
//! Adding a node only moves the keys which now fall onto one of its virtual nodes, all other keys
//! keep their owner.
//!
//! # Example
//! ```
//! # use geecache::consistenthash::HashRing;
//! let mut ring = HashRing::with_replicas(50);
//! ring.add(&["http://node-a:8001", "http://node-b:8001", "http://node-c:8001"]);
//!
//! let owner = ring.get("Tom").unwrap().to_owned();
//!
//! // The lookup is stable as long as the membership doesn't change...
//! assert_eq!(ring.get("Tom").unwrap(), owner);
//! ```
use std::collections::HashMap;

/// Computes the 32 bit hash of the given data.
pub type HashFn = fn(&[u8]) -> u32;

/// Computes the CRC-32 (IEEE) checksum which is used by default to place keys and nodes.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Maps keys onto a set of nodes using consistent hashing.
///
/// Note that the ring itself isn't synchronized. If nodes are added at runtime, the owner has to
/// guard lookups and updates using the same lock.
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    keys: Vec<u32>,
    nodes: HashMap<u32, String>,
}

impl HashRing {
    /// Creates a new ring which places each node **replicas** times using the given hash function.
    pub fn new(replicas: usize, hash: HashFn) -> Self {
        HashRing {
            hash,
            replicas,
            keys: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    /// Creates a new ring which uses [crc32] as hash function.
    pub fn with_replicas(replicas: usize) -> Self {
        HashRing::new(replicas, crc32)
    }

    /// Adds the given nodes to the ring.
    ///
    /// For each node, **replicas** virtual nodes are created by hashing the replica index
    /// followed by the node name. Calling this repeatedly accumulates nodes.
    pub fn add<S: AsRef<str>>(&mut self, nodes: &[S]) {
        for node in nodes {
            let node = node.as_ref();
            for replica in 0..self.replicas {
                let hash = (self.hash)(format!("{}{}", replica, node).as_bytes());
                self.keys.push(hash);
                let _ = self.nodes.insert(hash, node.to_owned());
            }
        }

        self.keys.sort_unstable();
    }

    /// Returns the node which owns the given key or **None** if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.keys.partition_point(|virtual_node| *virtual_node < hash);
        let virtual_node = self.keys[index % self.keys.len()];

        self.nodes.get(&virtual_node).map(String::as_str)
    }

    /// Returns the number of virtual nodes on the ring.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Determines if no node has been added yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
