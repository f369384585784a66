use crate::{
    node::NodeRef,
    prelude::*,
    proof,
    tree::{self, Iter},
};

/// Read operations shared by the working tree and by snapshots.
///
/// Implementors only expose their root and version; everything else is derived.
pub trait TreeView {
    /// Digest every node of this tree is hashed with.
    type Hasher: Digest32;

    /// The root node, if any. Its hash is filled in by [`hash`](TreeView::hash) and only
    /// readable through [`Node::cached_hash`](crate::node::Node::cached_hash).
    fn root_node(&self) -> Option<&NodeRef>;

    /// The version this view belongs to. For a working tree, the latest saved version
    /// (zero before the first save).
    fn version(&self) -> u64;

    fn has(&self, key: &[u8]) -> bool {
        self.get(key).1.is_some()
    }

    /// Looks up `key`, returning its in-order rank alongside the value.
    ///
    /// The rank is the number of keys strictly smaller than `key`, so an absent key gets the
    /// position it would be inserted at.
    fn get(&self, key: &[u8]) -> (u64, Option<&[u8]>) {
        tree::get(self.root_node(), key)
    }

    /// Returns the pair at in-order position `index`.
    fn get_by_index(&self, index: u64) -> Option<(&[u8], &[u8])> {
        tree::get_by_index(self.root_node(), index)
    }

    /// Looks up `key` and proves the answer against [`hash`](TreeView::hash).
    fn get_with_proof(&self, key: &[u8]) -> (Option<&[u8]>, Proof) {
        proof::build::<Self::Hasher>(self.root_node(), key)
    }

    /// Root hash, or the empty-tree hash when nothing is stored.
    fn hash(&self) -> Hash {
        self.root_node()
            .map_or_else(Hash::empty::<Self::Hasher>, |root| root.hash::<Self::Hasher>())
    }

    fn size(&self) -> u64 {
        self.root_node().map_or(0, |root| root.size())
    }

    fn height(&self) -> u8 {
        self.root_node().map_or(0, |root| root.height())
    }

    fn is_empty(&self) -> bool {
        self.root_node().is_none()
    }

    fn iter(&self) -> Iter<'_> {
        Iter::new(self.root_node(), None, None)
    }

    /// Iterates over keys in `[start, end)`; a missing bound leaves that side open.
    fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Iter<'_> {
        Iter::new(self.root_node(), start, end)
    }

    /// Audits ordering, balance, sizes, heights, split keys and cached hashes.
    fn check_invariants(&self) -> Result<()> {
        tree::check_invariants::<Self::Hasher>(self.root_node())
    }
}
