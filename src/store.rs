//! Persistence seam.
//!
//! The tree itself lives in memory. Every save and delete is mirrored to a [`NodeStore`] so
//! that an external collaborator (a database, a log, a replica) can keep a durable copy.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;

use crate::prelude::*;

/// Receives the nodes and roots written by [`MutableTree`](crate::MutableTree).
///
/// Errors are returned to the caller of the tree operation unchanged, wrapped in
/// [`Error::Storage`]. The tree never retries.
pub trait NodeStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persists one node under its hash.
    ///
    /// `bytes` is the node's canonical encoding, with children referenced by hash. Children
    /// are always saved before their parent. The same node may be offered more than once.
    fn save_node(&mut self, hash: Hash, bytes: Vec<u8>) -> Result<(), Self::Error>;

    /// Records the root of a saved version, `None` for an empty tree.
    fn save_root(&mut self, version: u64, root: Option<Hash>) -> Result<(), Self::Error>;

    fn delete_root(&mut self, version: u64) -> Result<(), Self::Error>;
}

/// A [`NodeStore`] that keeps everything in process memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    nodes: HashMap<Hash, Vec<u8>>,
    roots: BTreeMap<u64, Option<Hash>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, hash: &Hash) -> Option<&[u8]> {
        self.nodes.get(hash).map(Vec::as_slice)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the root recorded for `version`, or `None` if the version is not stored.
    pub fn root(&self, version: u64) -> Option<Option<Hash>> {
        self.roots.get(&version).copied()
    }

    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.roots.keys().copied()
    }
}

impl NodeStore for MemoryStore {
    type Error = Infallible;

    fn save_node(&mut self, hash: Hash, bytes: Vec<u8>) -> Result<(), Self::Error> {
        self.nodes.entry(hash).or_insert(bytes);
        Ok(())
    }

    fn save_root(&mut self, version: u64, root: Option<Hash>) -> Result<(), Self::Error> {
        self.roots.insert(version, root);
        Ok(())
    }

    fn delete_root(&mut self, version: u64) -> Result<(), Self::Error> {
        self.roots.remove(&version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_records_roots() {
        let mut store = MemoryStore::new();
        let root = Hash::new([7; 32]);

        store.save_root(1, Some(root)).unwrap();
        store.save_root(2, None).unwrap();

        assert_eq!(store.root(1), Some(Some(root)));
        assert_eq!(store.root(2), Some(None));
        assert_eq!(store.root(3), None);

        store.delete_root(1).unwrap();
        assert_eq!(store.versions().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_memory_store_keeps_first_copy_of_a_node() {
        let mut store = MemoryStore::new();
        let hash = Hash::new([1; 32]);

        store.save_node(hash, vec![1, 2, 3]).unwrap();
        store.save_node(hash, vec![1, 2, 3]).unwrap();

        assert_eq!(store.node_count(), 1);
        assert_eq!(store.node(&hash), Some(&[1, 2, 3][..]));
    }
}
