//! Existence and non-existence proofs.
//!
//! A proof lists, for every inner node between the root and a leaf, the direction taken,
//! the hash of the other child, and the node's split key, height and size. That is exactly
//! what is needed to recompute each parent digest from its child, so a verifier holding
//! only the root hash can replay the path bottom-up.
//!
//! A missing key is proven by its in-order neighbours: the predecessor and the successor
//! must both be in the tree and must sit next to each other, which the verifier checks
//! from the shape of their two paths.

use proptest::{collection::vec, prelude::*};
use tracing::trace;

use crate::{
    node::{Kind, NodeRef},
    prelude::*,
    tree,
};

mod encode;
mod verify;

pub use verify::verify;

/// Which child a path descends into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Left,
    Right,
}

/// One inner node on the path from the root to a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// The child the path continues into.
    pub direction: Direction,
    pub height: u8,
    pub size: u64,
    pub split_key: Vec<u8>,
    /// Hash of the child the path does not take.
    pub sibling: Hash,
}

/// A leaf together with its path, ordered from the root down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafProof {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub path: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proof {
    /// `key` is present with the given value.
    Existence(LeafProof),
    /// `key` is absent. `left` and `right` are its closest neighbours, missing at the edges
    /// of the key space; both are missing only for an empty tree.
    NonExistence {
        key: Vec<u8>,
        left: Option<LeafProof>,
        right: Option<LeafProof>,
    },
}

impl Proof {
    /// Returns the key this proof speaks about.
    pub fn key(&self) -> &[u8] {
        match self {
            Proof::Existence(leaf) => &leaf.key,
            Proof::NonExistence { key, .. } => key,
        }
    }

    /// Returns the value proven to exist, if this is an existence proof.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Proof::Existence(leaf) => Some(&leaf.value),
            Proof::NonExistence { .. } => None,
        }
    }

    pub fn is_existence(&self) -> bool {
        matches!(self, Proof::Existence(_))
    }
}

/// Builds a proof for `key` under `root`, returning the value alongside it.
pub(crate) fn build<'a, D: Digest32>(
    root: Option<&'a NodeRef>,
    key: &[u8],
) -> (Option<&'a [u8]>, Proof) {
    let (index, value) = tree::get(root, key);

    if value.is_some() {
        if let Some(leaf) = leaf_at::<D>(root, index) {
            return (value, Proof::Existence(leaf));
        }
    }

    trace!(
        key = %hex::encode(key),
        index,
        "building non-existence proof"
    );

    let left = index
        .checked_sub(1)
        .and_then(|index| leaf_at::<D>(root, index));
    let right = leaf_at::<D>(root, index);

    (
        None,
        Proof::NonExistence {
            key: key.to_vec(),
            left,
            right,
        },
    )
}

/// Walks to the leaf at in-order position `index`, recording the path.
fn leaf_at<D: Digest32>(root: Option<&NodeRef>, mut index: u64) -> Option<LeafProof> {
    let mut node = root?;
    let mut path = Vec::with_capacity(node.height() as usize);

    if index >= node.size() {
        return None;
    }

    loop {
        match node.kind() {
            Kind::Leaf { key, value } => {
                return Some(LeafProof {
                    key: key.clone(),
                    value: value.clone(),
                    path,
                })
            }
            Kind::Inner {
                left,
                right,
                split_key,
            } => {
                let (direction, next, sibling) = if index < left.size() {
                    (Direction::Left, left, right)
                } else {
                    index -= left.size();
                    (Direction::Right, right, left)
                };

                path.push(Step {
                    direction,
                    height: node.height(),
                    size: node.size(),
                    split_key: split_key.clone(),
                    sibling: sibling.hash::<D>(),
                });
                node = next;
            }
        }
    }
}

impl Arbitrary for Direction {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![Just(Direction::Left), Just(Direction::Right)].boxed()
    }
}

impl Arbitrary for Step {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        (
            any::<Direction>(),
            any::<u8>(),
            any::<u64>(),
            vec(any::<u8>(), 0..8),
            any::<Hash>(),
        )
            .prop_map(|(direction, height, size, split_key, sibling)| Step {
                direction,
                height,
                size,
                split_key,
                sibling,
            })
            .boxed()
    }
}

impl Arbitrary for LeafProof {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        (
            vec(any::<u8>(), 0..8),
            vec(any::<u8>(), 0..8),
            vec(any::<Step>(), 0..6),
        )
            .prop_map(|(key, value, path)| LeafProof { key, value, path })
            .boxed()
    }
}

impl Arbitrary for Proof {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            any::<LeafProof>().prop_map(Proof::Existence),
            (
                vec(any::<u8>(), 0..8),
                proptest::option::of(any::<LeafProof>()),
                proptest::option::of(any::<LeafProof>())
            )
                .prop_map(|(key, left, right)| Proof::NonExistence { key, left, right })
        ]
        .boxed()
    }
}
