//! Prefixed Merkle Patricia Trie.
//!
//! Every named trie in the node (account state, record state, the five PoC
//! context tries, the three record context tries) lives in one key-value
//! store. Each trie carries a byte prefix; a node with hash `H` is persisted
//! under `prefix ‖ H`, so tries never collide.
//!
//! Handles are cheap to clone. The node cache is content-addressed and
//! append-only, so clones share it and diverge only in their root hash.
//! Reads fall through the cache to the key-value store; a hash that neither
//! side knows is reported as [`StorageError::MissingNode`].

use parking_lot::RwLock;
use provenet_types::{keccak256, H256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::db::{KvStore, TrieWriter};
use crate::{Result, StorageError, EMPTY_ROOT};

/// Nibble representation for trie paths
#[derive(Debug, Clone, PartialEq, Eq)]
struct Nibbles(Vec<u8>);

impl Nibbles {
    /// Create nibbles from bytes
    fn from_bytes(bytes: &[u8]) -> Self {
        let mut nibbles = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0f);
        }
        Nibbles(nibbles)
    }

    /// Convert an even-length nibble path back to bytes
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() / 2);
        for pair in self.0.chunks(2) {
            if pair.len() == 2 {
                bytes.push((pair[0] << 4) | pair[1]);
            }
        }
        bytes
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn slice(&self, start: usize) -> Nibbles {
        Nibbles(self.0[start..].to_vec())
    }

    fn common_prefix_len(&self, other: &Nibbles) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Encode nibbles with prefix for compact encoding
    /// - For leaf nodes: prefix 0x2 (even length) or 0x3 (odd length)
    /// - For extension nodes: prefix 0x0 (even length) or 0x1 (odd length)
    fn encode_compact(&self, is_leaf: bool) -> Vec<u8> {
        let odd = self.0.len() % 2 == 1;
        let mut result = Vec::with_capacity(self.0.len() / 2 + 1);

        let prefix: u8 = match (is_leaf, odd) {
            (false, false) => 0x00,
            (false, true) => 0x01,
            (true, false) => 0x02,
            (true, true) => 0x03,
        };

        if odd {
            result.push((prefix << 4) | self.0[0]);
            for pair in self.0[1..].chunks(2) {
                if pair.len() == 2 {
                    result.push((pair[0] << 4) | pair[1]);
                }
            }
        } else {
            result.push(prefix << 4);
            for pair in self.0.chunks(2) {
                if pair.len() == 2 {
                    result.push((pair[0] << 4) | pair[1]);
                }
            }
        }

        result
    }

    /// Decode compact encoding, returning the nibbles and the leaf flag
    fn decode_compact(data: &[u8]) -> (Nibbles, bool) {
        if data.is_empty() {
            return (Nibbles(vec![]), false);
        }

        let prefix = data[0] >> 4;
        let is_leaf = prefix >= 2;
        let odd = prefix % 2 == 1;

        let mut nibbles = Vec::new();

        if odd {
            nibbles.push(data[0] & 0x0f);
        }

        for &byte in &data[1..] {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0f);
        }

        (Nibbles(nibbles), is_leaf)
    }
}

/// Trie node types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrieNode {
    /// Empty node
    Empty,
    /// Leaf node with path suffix and value
    Leaf {
        /// Path suffix (compact encoded)
        path: Vec<u8>,
        /// Value stored at this leaf
        value: Vec<u8>,
    },
    /// Extension node with shared path prefix
    Extension {
        /// Shared path prefix (compact encoded)
        path: Vec<u8>,
        /// Hash of child node
        child: H256,
    },
    /// Branch node with 16 children and optional value
    Branch {
        /// Children (16 slots for each nibble 0-f)
        children: [Option<H256>; 16],
        /// Value if this node is also a leaf
        value: Option<Vec<u8>>,
    },
}

impl TrieNode {
    /// Compute the hash of this node
    pub fn hash(&self) -> H256 {
        keccak256(&self.encode())
    }

    /// Encode the node for storage
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    /// Decode a node from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// A Merkle Patricia Trie whose nodes are persisted under a byte prefix.
pub struct PrefixTrie {
    /// Byte prefix applied to every persisted node key
    prefix: Vec<u8>,
    /// Content-addressed node cache, shared between clones
    nodes: Arc<RwLock<HashMap<H256, TrieNode>>>,
    /// Backing store for nodes not in the cache
    db: Arc<dyn KvStore>,
    /// Current root hash (EMPTY_ROOT while the trie holds no entries)
    root: H256,
}

impl PrefixTrie {
    /// Creates an empty trie over the given store.
    pub fn new(prefix: &[u8], db: Arc<dyn KvStore>) -> Self {
        Self {
            prefix: prefix.to_vec(),
            nodes: Arc::new(RwLock::new(HashMap::new())),
            db,
            root: EMPTY_ROOT,
        }
    }

    /// Re-opens a committed trie at the given root.
    ///
    /// Nodes are loaded lazily from the store; a root that was never
    /// committed surfaces as [`StorageError::MissingNode`] on first access.
    pub fn open(prefix: &[u8], root: H256, db: Arc<dyn KvStore>) -> Self {
        let root = if root.is_nil() { EMPTY_ROOT } else { root };
        Self {
            prefix: prefix.to_vec(),
            nodes: Arc::new(RwLock::new(HashMap::new())),
            db,
            root,
        }
    }

    /// Returns the current root hash.
    pub fn root_hash(&self) -> H256 {
        self.root
    }

    /// Checks if the trie holds no entries.
    pub fn is_empty(&self) -> bool {
        self.root == EMPTY_ROOT
    }

    /// Returns the backing store handle.
    pub fn db(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.db)
    }

    /// Reads the value stored under `key`.
    pub fn try_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_at(self.root, Nibbles::from_bytes(key))
    }

    /// Inserts or updates `key`. An empty value deletes the entry.
    pub fn try_update(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if value.is_empty() {
            return self.try_delete(key);
        }
        let new_root = self.insert_at(self.root, Nibbles::from_bytes(key), value)?;
        trace!(key = %hex::encode(key), root = %new_root, "trie update");
        self.root = new_root;
        Ok(())
    }

    /// Deletes `key`. Removing an absent key is a no-op.
    pub fn try_delete(&mut self, key: &[u8]) -> Result<()> {
        if let Some(new_root) = self.delete_at(self.root, Nibbles::from_bytes(key))? {
            self.root = new_root;
        }
        Ok(())
    }

    /// Collects all `(key, value)` entries in ascending key order.
    pub fn iter(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        self.collect(self.root, Nibbles(vec![]), &mut out)?;
        Ok(out)
    }

    /// Collects entries whose key starts with `key_prefix`, in ascending
    /// key order.
    pub fn iter_prefix(&self, key_prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.iter()?;
        Ok(entries
            .into_iter()
            .filter(|(key, _)| key.starts_with(key_prefix))
            .collect())
    }

    /// Checks whether any key starts with `key_prefix`.
    pub fn has_key_prefix(&self, key_prefix: &[u8]) -> Result<bool> {
        Ok(!self.iter_prefix(key_prefix)?.is_empty())
    }

    /// Writes every node reachable from the root through `writer` and
    /// returns the root hash.
    pub fn commit_to(&self, writer: &mut dyn TrieWriter) -> Result<H256> {
        if self.root == EMPTY_ROOT {
            return Ok(EMPTY_ROOT);
        }
        self.commit_node(self.root, writer)?;
        Ok(self.root)
    }

    fn commit_node(&self, node_hash: H256, writer: &mut dyn TrieWriter) -> Result<()> {
        let node = self.get_node(&node_hash)?;
        writer.put(&self.node_key(&node_hash), &node.encode())?;
        match node {
            TrieNode::Extension { child, .. } => self.commit_node(child, writer)?,
            TrieNode::Branch { children, .. } => {
                for child in children.into_iter().flatten() {
                    self.commit_node(child, writer)?;
                }
            }
            TrieNode::Empty | TrieNode::Leaf { .. } => {}
        }
        Ok(())
    }

    /// Internal insert implementation
    fn insert_at(&self, node_hash: H256, path: Nibbles, value: &[u8]) -> Result<H256> {
        if node_hash == EMPTY_ROOT {
            let leaf = TrieNode::Leaf {
                path: path.encode_compact(true),
                value: value.to_vec(),
            };
            return Ok(self.store_node(leaf));
        }

        let node = self.get_node(&node_hash)?;

        match node {
            TrieNode::Empty => {
                let leaf = TrieNode::Leaf {
                    path: path.encode_compact(true),
                    value: value.to_vec(),
                };
                Ok(self.store_node(leaf))
            }
            TrieNode::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                let (leaf_nibbles, _) = Nibbles::decode_compact(&leaf_path);

                if leaf_nibbles.0 == path.0 {
                    // Same key, update value
                    let new_leaf = TrieNode::Leaf {
                        path: leaf_path,
                        value: value.to_vec(),
                    };
                    Ok(self.store_node(new_leaf))
                } else {
                    // Different keys, split into a branch
                    let common_len = leaf_nibbles.common_prefix_len(&path);

                    let mut branch_children: [Option<H256>; 16] = Default::default();
                    let mut branch_value = None;

                    // Re-insert existing leaf below the branch
                    if common_len < leaf_nibbles.len() {
                        let nibble = leaf_nibbles.0[common_len] as usize;
                        let remaining = leaf_nibbles.slice(common_len + 1);
                        if remaining.is_empty() {
                            branch_value = Some(leaf_value.clone());
                        } else {
                            let new_leaf = TrieNode::Leaf {
                                path: remaining.encode_compact(true),
                                value: leaf_value,
                            };
                            branch_children[nibble] = Some(self.store_node(new_leaf));
                        }
                    } else {
                        branch_value = Some(leaf_value);
                    }

                    // Insert new value
                    if common_len < path.len() {
                        let nibble = path.0[common_len] as usize;
                        let remaining = path.slice(common_len + 1);
                        if remaining.is_empty() {
                            branch_value = Some(value.to_vec());
                        } else {
                            let new_leaf = TrieNode::Leaf {
                                path: remaining.encode_compact(true),
                                value: value.to_vec(),
                            };
                            branch_children[nibble] = Some(self.store_node(new_leaf));
                        }
                    } else {
                        branch_value = Some(value.to_vec());
                    }

                    let branch = TrieNode::Branch {
                        children: branch_children,
                        value: branch_value,
                    };
                    let branch_hash = self.store_node(branch);

                    // A shared prefix becomes an extension above the branch
                    if common_len > 0 {
                        let prefix = Nibbles(path.0[..common_len].to_vec());
                        let extension = TrieNode::Extension {
                            path: prefix.encode_compact(false),
                            child: branch_hash,
                        };
                        Ok(self.store_node(extension))
                    } else {
                        Ok(branch_hash)
                    }
                }
            }
            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let (ext_nibbles, _) = Nibbles::decode_compact(&ext_path);
                let common_len = ext_nibbles.common_prefix_len(&path);

                if common_len == ext_nibbles.len() {
                    // Path goes through the extension
                    let remaining = path.slice(common_len);
                    let new_child = self.insert_at(child, remaining, value)?;
                    let new_ext = TrieNode::Extension {
                        path: ext_path,
                        child: new_child,
                    };
                    Ok(self.store_node(new_ext))
                } else {
                    // Split the extension
                    let mut branch_children: [Option<H256>; 16] = Default::default();

                    if common_len + 1 < ext_nibbles.len() {
                        let nibble = ext_nibbles.0[common_len] as usize;
                        let remaining = ext_nibbles.slice(common_len + 1);
                        let new_ext = TrieNode::Extension {
                            path: remaining.encode_compact(false),
                            child,
                        };
                        branch_children[nibble] = Some(self.store_node(new_ext));
                    } else {
                        let nibble = ext_nibbles.0[common_len] as usize;
                        branch_children[nibble] = Some(child);
                    }

                    let mut branch_value = None;
                    if common_len < path.len() {
                        let nibble = path.0[common_len] as usize;
                        let remaining = path.slice(common_len + 1);
                        if remaining.is_empty() {
                            branch_value = Some(value.to_vec());
                        } else {
                            let new_leaf = TrieNode::Leaf {
                                path: remaining.encode_compact(true),
                                value: value.to_vec(),
                            };
                            branch_children[nibble] = Some(self.store_node(new_leaf));
                        }
                    } else {
                        branch_value = Some(value.to_vec());
                    }

                    let branch = TrieNode::Branch {
                        children: branch_children,
                        value: branch_value,
                    };
                    let branch_hash = self.store_node(branch);

                    if common_len > 0 {
                        let prefix = Nibbles(path.0[..common_len].to_vec());
                        let extension = TrieNode::Extension {
                            path: prefix.encode_compact(false),
                            child: branch_hash,
                        };
                        Ok(self.store_node(extension))
                    } else {
                        Ok(branch_hash)
                    }
                }
            }
            TrieNode::Branch {
                mut children,
                value: branch_value,
            } => {
                if path.is_empty() {
                    let new_branch = TrieNode::Branch {
                        children,
                        value: Some(value.to_vec()),
                    };
                    Ok(self.store_node(new_branch))
                } else {
                    let nibble = path.0[0] as usize;
                    let remaining = path.slice(1);
                    let child_hash = children[nibble].unwrap_or(EMPTY_ROOT);
                    let new_child = self.insert_at(child_hash, remaining, value)?;
                    children[nibble] = Some(new_child);
                    let new_branch = TrieNode::Branch {
                        children,
                        value: branch_value,
                    };
                    Ok(self.store_node(new_branch))
                }
            }
        }
    }

    /// Internal get implementation
    fn get_at(&self, node_hash: H256, path: Nibbles) -> Result<Option<Vec<u8>>> {
        if node_hash == EMPTY_ROOT {
            return Ok(None);
        }

        let node = self.get_node(&node_hash)?;

        match node {
            TrieNode::Empty => Ok(None),
            TrieNode::Leaf {
                path: leaf_path,
                value,
            } => {
                let (leaf_nibbles, _) = Nibbles::decode_compact(&leaf_path);
                if leaf_nibbles.0 == path.0 {
                    Ok(Some(value))
                } else {
                    Ok(None)
                }
            }
            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let (ext_nibbles, _) = Nibbles::decode_compact(&ext_path);
                if path.0.len() >= ext_nibbles.len() && path.0[..ext_nibbles.len()] == ext_nibbles.0
                {
                    let remaining = path.slice(ext_nibbles.len());
                    self.get_at(child, remaining)
                } else {
                    Ok(None)
                }
            }
            TrieNode::Branch { children, value } => {
                if path.is_empty() {
                    Ok(value)
                } else {
                    let nibble = path.0[0] as usize;
                    match children[nibble] {
                        Some(child_hash) => {
                            let remaining = path.slice(1);
                            self.get_at(child_hash, remaining)
                        }
                        None => Ok(None),
                    }
                }
            }
        }
    }

    /// Internal delete implementation; Some(new_root) when the key existed
    fn delete_at(&self, node_hash: H256, path: Nibbles) -> Result<Option<H256>> {
        if node_hash == EMPTY_ROOT {
            return Ok(None);
        }

        let node = self.get_node(&node_hash)?;

        match node {
            TrieNode::Empty => Ok(None),
            TrieNode::Leaf {
                path: leaf_path, ..
            } => {
                let (leaf_nibbles, _) = Nibbles::decode_compact(&leaf_path);
                if leaf_nibbles.0 == path.0 {
                    Ok(Some(EMPTY_ROOT))
                } else {
                    Ok(None)
                }
            }
            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let (ext_nibbles, _) = Nibbles::decode_compact(&ext_path);
                if path.0.len() >= ext_nibbles.len() && path.0[..ext_nibbles.len()] == ext_nibbles.0
                {
                    let remaining = path.slice(ext_nibbles.len());
                    if let Some(new_child) = self.delete_at(child, remaining)? {
                        if new_child == EMPTY_ROOT {
                            Ok(Some(EMPTY_ROOT))
                        } else {
                            let new_ext = TrieNode::Extension {
                                path: ext_path,
                                child: new_child,
                            };
                            Ok(Some(self.store_node(new_ext)))
                        }
                    } else {
                        Ok(None)
                    }
                } else {
                    Ok(None)
                }
            }
            TrieNode::Branch {
                mut children,
                value,
            } => {
                if path.is_empty() {
                    if value.is_none() {
                        return Ok(None);
                    }
                    let new_branch = TrieNode::Branch {
                        children,
                        value: None,
                    };
                    Ok(Some(self.store_node(new_branch)))
                } else {
                    let nibble = path.0[0] as usize;
                    match children[nibble] {
                        Some(child_hash) => {
                            let remaining = path.slice(1);
                            if let Some(new_child) = self.delete_at(child_hash, remaining)? {
                                if new_child == EMPTY_ROOT {
                                    children[nibble] = None;
                                } else {
                                    children[nibble] = Some(new_child);
                                }
                                // A branch left with no children and no value
                                // collapses back to empty
                                if value.is_none()
                                    && children.iter().all(|c| c.is_none())
                                {
                                    return Ok(Some(EMPTY_ROOT));
                                }
                                let new_branch = TrieNode::Branch { children, value };
                                Ok(Some(self.store_node(new_branch)))
                            } else {
                                Ok(None)
                            }
                        }
                        None => Ok(None),
                    }
                }
            }
        }
    }

    /// Internal ordered traversal accumulating full keys
    fn collect(
        &self,
        node_hash: H256,
        acc: Nibbles,
        out: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<()> {
        if node_hash == EMPTY_ROOT {
            return Ok(());
        }

        let node = self.get_node(&node_hash)?;

        match node {
            TrieNode::Empty => Ok(()),
            TrieNode::Leaf { path, value } => {
                let (leaf_nibbles, _) = Nibbles::decode_compact(&path);
                let mut full = acc;
                full.0.extend_from_slice(&leaf_nibbles.0);
                out.push((full.to_bytes(), value));
                Ok(())
            }
            TrieNode::Extension { path, child } => {
                let (ext_nibbles, _) = Nibbles::decode_compact(&path);
                let mut full = acc;
                full.0.extend_from_slice(&ext_nibbles.0);
                self.collect(child, full, out)
            }
            TrieNode::Branch { children, value } => {
                if let Some(value) = value {
                    out.push((acc.to_bytes(), value));
                }
                for (nibble, child) in children.iter().enumerate() {
                    if let Some(child_hash) = child {
                        let mut next = acc.clone();
                        next.0.push(nibble as u8);
                        self.collect(*child_hash, next, out)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Store a node in the shared cache and return its hash
    fn store_node(&self, node: TrieNode) -> H256 {
        let hash = node.hash();
        self.nodes.write().insert(hash, node);
        hash
    }

    /// Resolve a node by hash: cache first, then the backing store
    fn get_node(&self, hash: &H256) -> Result<TrieNode> {
        if let Some(node) = self.nodes.read().get(hash) {
            return Ok(node.clone());
        }

        match self.db.get(&self.node_key(hash))? {
            Some(data) => {
                let node = TrieNode::decode(&data)?;
                self.nodes.write().insert(*hash, node.clone());
                Ok(node)
            }
            None => Err(StorageError::MissingNode(*hash)),
        }
    }

    /// Persistent key for a node: prefix ‖ hash
    fn node_key(&self, hash: &H256) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + 32);
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(hash.as_bytes());
        key
    }
}

impl Clone for PrefixTrie {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            nodes: Arc::clone(&self.nodes),
            db: Arc::clone(&self.db),
            root: self.root,
        }
    }
}

impl std::fmt::Debug for PrefixTrie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixTrie")
            .field("prefix", &String::from_utf8_lossy(&self.prefix))
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;

    fn empty_trie() -> PrefixTrie {
        PrefixTrie::new(b"test-", Arc::new(MemoryDb::new()))
    }

    #[test]
    fn test_insert_get() {
        let mut trie = empty_trie();
        assert!(trie.is_empty());

        trie.try_update(b"key1", b"value1").unwrap();
        trie.try_update(b"key2", b"value2").unwrap();

        assert_eq!(trie.try_get(b"key1").unwrap().unwrap(), b"value1");
        assert_eq!(trie.try_get(b"key2").unwrap().unwrap(), b"value2");
        assert!(trie.try_get(b"key3").unwrap().is_none());
        assert!(!trie.is_empty());
    }

    #[test]
    fn test_update_existing() {
        let mut trie = empty_trie();
        trie.try_update(b"key", b"old").unwrap();
        trie.try_update(b"key", b"new").unwrap();
        assert_eq!(trie.try_get(b"key").unwrap().unwrap(), b"new");
    }

    #[test]
    fn test_delete() {
        let mut trie = empty_trie();
        trie.try_update(b"a", b"1").unwrap();
        trie.try_update(b"b", b"2").unwrap();

        trie.try_delete(b"a").unwrap();
        assert!(trie.try_get(b"a").unwrap().is_none());
        assert_eq!(trie.try_get(b"b").unwrap().unwrap(), b"2");

        // Deleting an absent key is a no-op
        let root = trie.root_hash();
        trie.try_delete(b"missing").unwrap();
        assert_eq!(trie.root_hash(), root);
    }

    #[test]
    fn test_root_tracks_content() {
        let mut trie = empty_trie();
        let empty = trie.root_hash();
        assert_eq!(empty, EMPTY_ROOT);

        trie.try_update(b"key", b"value").unwrap();
        let filled = trie.root_hash();
        assert_ne!(empty, filled);

        trie.try_delete(b"key").unwrap();
        assert_eq!(trie.root_hash(), EMPTY_ROOT);
    }

    #[test]
    fn test_insertion_order_independence() {
        let mut a = empty_trie();
        a.try_update(b"one", b"1").unwrap();
        a.try_update(b"two", b"2").unwrap();
        a.try_update(b"three", b"3").unwrap();

        let mut b = empty_trie();
        b.try_update(b"three", b"3").unwrap();
        b.try_update(b"one", b"1").unwrap();
        b.try_update(b"two", b"2").unwrap();

        assert_eq!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn test_iter_sorted() {
        let mut trie = empty_trie();
        trie.try_update(&[0x20], b"b").unwrap();
        trie.try_update(&[0x10], b"a").unwrap();
        trie.try_update(&[0x30, 0x01], b"c").unwrap();

        let entries = trie.iter().unwrap();
        let keys: Vec<Vec<u8>> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![vec![0x10], vec![0x20], vec![0x30, 0x01]]);
    }

    #[test]
    fn test_iter_prefix() {
        let mut trie = empty_trie();
        trie.try_update(&[0x01, 0xAA], b"1").unwrap();
        trie.try_update(&[0x01, 0xBB], b"2").unwrap();
        trie.try_update(&[0x02, 0xAA], b"3").unwrap();

        let entries = trie.iter_prefix(&[0x01]).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(trie.has_key_prefix(&[0x01]).unwrap());
        assert!(trie.has_key_prefix(&[0x02]).unwrap());
        assert!(!trie.has_key_prefix(&[0x03]).unwrap());
    }

    #[test]
    fn test_clone_shares_nodes_not_root() {
        let mut trie = empty_trie();
        trie.try_update(b"key", b"value").unwrap();

        let snapshot = trie.clone();
        trie.try_update(b"key", b"changed").unwrap();

        assert_eq!(snapshot.try_get(b"key").unwrap().unwrap(), b"value");
        assert_eq!(trie.try_get(b"key").unwrap().unwrap(), b"changed");
        assert_ne!(snapshot.root_hash(), trie.root_hash());
    }

    #[test]
    fn test_commit_and_reopen() {
        let db: Arc<MemoryDb> = Arc::new(MemoryDb::new());
        let mut trie = PrefixTrie::new(b"epoch-", Arc::clone(&db) as Arc<dyn KvStore>);
        trie.try_update(b"validator", b"payload").unwrap();

        let mut batch = crate::db::WriteBatch::new();
        let root = trie.commit_to(&mut batch).unwrap();
        db.write_batch(batch).unwrap();

        let reopened = PrefixTrie::open(b"epoch-", root, db as Arc<dyn KvStore>);
        assert_eq!(reopened.try_get(b"validator").unwrap().unwrap(), b"payload");
    }

    #[test]
    fn test_missing_node_on_unknown_root() {
        let db: Arc<dyn KvStore> = Arc::new(MemoryDb::new());
        let trie = PrefixTrie::open(b"candidate-", H256::keccak256(b"nowhere"), db);
        let err = trie.try_get(b"key").unwrap_err();
        assert!(err.is_missing_node());
    }

    #[test]
    fn test_prefixes_isolate_tries() {
        let db: Arc<MemoryDb> = Arc::new(MemoryDb::new());
        let mut a = PrefixTrie::new(b"a-", Arc::clone(&db) as Arc<dyn KvStore>);
        let mut b = PrefixTrie::new(b"b-", Arc::clone(&db) as Arc<dyn KvStore>);

        a.try_update(b"key", b"from-a").unwrap();
        b.try_update(b"key", b"from-b").unwrap();

        let mut batch = crate::db::WriteBatch::new();
        let root_a = a.commit_to(&mut batch).unwrap();
        let root_b = b.commit_to(&mut batch).unwrap();
        db.write_batch(batch).unwrap();

        // Same key, same value layout, different prefixes: both roots
        // resolve against the shared store
        let a2 = PrefixTrie::open(b"a-", root_a, Arc::clone(&db) as Arc<dyn KvStore>);
        let b2 = PrefixTrie::open(b"b-", root_b, db as Arc<dyn KvStore>);
        assert_eq!(a2.try_get(b"key").unwrap().unwrap(), b"from-a");
        assert_eq!(b2.try_get(b"key").unwrap().unwrap(), b"from-b");
    }
}
