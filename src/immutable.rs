use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;

use crate::{
    hash::{DefaultDigest, Digest32},
    node::NodeRef,
    view::TreeView,
};

/// A read-only snapshot of one saved version.
///
/// Snapshots share their nodes with the tree they came from, are cheap to clone and can be
/// sent to other threads. There is no way to mutate one.
pub struct ImmutableTree<D: Digest32 = DefaultDigest> {
    root: Option<NodeRef>,
    version: u64,
    _digest: PhantomData<fn() -> D>,
}

impl<D: Digest32> ImmutableTree<D> {
    pub(crate) fn new(root: Option<NodeRef>, version: u64) -> Self {
        Self {
            root,
            version,
            _digest: PhantomData,
        }
    }
}

impl<D: Digest32> TreeView for ImmutableTree<D> {
    type Hasher = D;

    fn root_node(&self) -> Option<&NodeRef> {
        self.root.as_ref()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl<D: Digest32> Clone for ImmutableTree<D> {
    fn clone(&self) -> Self {
        Self::new(self.root.clone(), self.version)
    }
}

impl<D: Digest32> Debug for ImmutableTree<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmutableTree")
            .field("version", &self.version)
            .field("size", &self.size())
            .field("hash", &self.hash())
            .finish()
    }
}

impl<D: Digest32> PartialEq for ImmutableTree<D> {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.hash() == other.hash()
    }
}

impl<D: Digest32> Eq for ImmutableTree<D> {}
