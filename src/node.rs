use std::sync::{Arc, OnceLock};

use crate::prelude::*;

/// A shared, immutable reference to a node.
///
/// Versions and the working tree hold these; a node lives as long as any root reaches it.
pub type NodeRef = Arc<Node>;

/// The two shapes a node can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Leaf {
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Inner {
        left: NodeRef,
        right: NodeRef,
        /// The smallest key stored under `right`.
        split_key: Vec<u8>,
    },
}

/// A node of the tree.
///
/// Nodes are never modified after construction: every mutation builds new nodes along the
/// path it touches and keeps pointing at the untouched ones. The only interior state is the
/// hash cell, which is filled at most once.
#[derive(Debug)]
pub struct Node {
    kind: Kind,
    height: u8,
    size: u64,
    /// Version in which the node was created. Not part of the commitment.
    version: u64,
    hash: OnceLock<Hash>,
}

impl Node {
    pub(crate) fn leaf(key: Vec<u8>, value: Vec<u8>, version: u64) -> NodeRef {
        Arc::new(Node {
            kind: Kind::Leaf { key, value },
            height: 0,
            size: 1,
            version,
            hash: OnceLock::new(),
        })
    }

    /// Builds an inner node, deriving height and size from its children.
    pub(crate) fn inner(left: NodeRef, right: NodeRef, split_key: Vec<u8>, version: u64) -> NodeRef {
        let height = 1 + left.height.max(right.height);
        let size = left.size + right.size;

        Arc::new(Node {
            kind: Kind::Inner {
                left,
                right,
                split_key,
            },
            height,
            size,
            version,
            hash: OnceLock::new(),
        })
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, Kind::Leaf { .. })
    }

    /// The key of a leaf, or the split key of an inner node.
    pub fn key(&self) -> &[u8] {
        match &self.kind {
            Kind::Leaf { key, .. } => key,
            Kind::Inner { split_key, .. } => split_key,
        }
    }

    /// The value of a leaf. Inner nodes carry no value.
    pub fn value(&self) -> Option<&[u8]> {
        match &self.kind {
            Kind::Leaf { value, .. } => Some(value),
            Kind::Inner { .. } => None,
        }
    }

    pub fn left(&self) -> Option<&NodeRef> {
        match &self.kind {
            Kind::Inner { left, .. } => Some(left),
            Kind::Leaf { .. } => None,
        }
    }

    pub fn right(&self) -> Option<&NodeRef> {
        match &self.kind {
            Kind::Inner { right, .. } => Some(right),
            Kind::Leaf { .. } => None,
        }
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    /// Number of leaves in this subtree.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// `height(left) - height(right)`, zero for leaves.
    pub(crate) fn balance_factor(&self) -> i16 {
        match &self.kind {
            Kind::Inner { left, right, .. } => left.height as i16 - right.height as i16,
            Kind::Leaf { .. } => 0,
        }
    }

    /// Returns the node hash, computing it (and any missing child hash) on first access.
    ///
    /// The result is cached in the node and reused by every root that shares it, so only the
    /// tree owning the node picks the digest.
    pub(crate) fn hash<D: Digest32>(&self) -> Hash {
        *self.hash.get_or_init(|| match &self.kind {
            Kind::Leaf { key, value } => Hash::leaf::<D>(key, value),
            Kind::Inner {
                left,
                right,
                split_key,
            } => Hash::inner::<D>(
                &left.hash::<D>(),
                &right.hash::<D>(),
                split_key,
                self.height,
                self.size,
            ),
        })
    }

    /// The hash computed by the owning tree, if it was already needed.
    ///
    /// Hashing is driven by the tree and its digest; a node cannot be hashed from outside:
    ///
    /// ```compile_fail
    /// use merkle_avl::prelude::*;
    ///
    /// let mut tree: MutableTree = MutableTree::new();
    /// tree.set(b"a", b"1");
    /// tree.root_node().map(|node| node.hash::<sha2::Sha256>());
    /// ```
    pub fn cached_hash(&self) -> Option<Hash> {
        self.hash.get().copied()
    }

    /// Whether the hash of this node has already been computed.
    pub fn is_hashed(&self) -> bool {
        self.hash.get().is_some()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.height == other.height && self.size == other.size
    }
}

impl Eq for Node {}

/// Canonical persistence encoding of a single node, children referenced by hash.
///
/// Leaf: `0x00 || len(key) || key || len(value) || value || version`.
/// Inner: `0x01 || height || size || version || len(split_key) || split_key || left || right`.
/// Lengths and integers are big-endian `u64`.
///
/// Calling this forces the node's hash (and its children's) with digest `D`.
pub(crate) fn encode<D: Digest32>(node: &Node) -> Vec<u8> {
    let mut bytes = Vec::new();

    match &node.kind {
        Kind::Leaf { key, value } => {
            bytes.push(0x00);
            write_prefixed(&mut bytes, key);
            write_prefixed(&mut bytes, value);
            bytes.extend_from_slice(&node.version.to_be_bytes());
        }
        Kind::Inner {
            left,
            right,
            split_key,
        } => {
            bytes.push(0x01);
            bytes.push(node.height);
            bytes.extend_from_slice(&node.size.to_be_bytes());
            bytes.extend_from_slice(&node.version.to_be_bytes());
            write_prefixed(&mut bytes, split_key);
            bytes.extend_from_slice(left.hash::<D>().as_ref());
            bytes.extend_from_slice(right.hash::<D>().as_ref());
        }
    }

    bytes
}

pub(crate) fn write_prefixed(bytes: &mut Vec<u8>, data: &[u8]) {
    bytes.extend_from_slice(&(data.len() as u64).to_be_bytes());
    bytes.extend_from_slice(data);
}
