use tracing::trace;

use super::{Direction, LeafProof, Proof, Step};
use crate::prelude::*;

/// Checks `proof` against `root` for the claim that `key` maps to `value`, or is absent when
/// `value` is `None`.
///
/// Any malformed or inconsistent proof yields `false`.
pub fn verify<D: Digest32>(proof: &Proof, root: &Hash, key: &[u8], value: Option<&[u8]>) -> bool {
    proof.verify::<D>(root, key, value)
}

impl Proof {
    /// See [`verify`].
    pub fn verify<D: Digest32>(&self, root: &Hash, key: &[u8], value: Option<&[u8]>) -> bool {
        let claim_matches = match (self, value) {
            (Proof::Existence(leaf), Some(value)) => leaf.key == key && leaf.value == value,
            (Proof::NonExistence { key: absent, .. }, None) => absent == key,
            _ => false,
        };

        if !claim_matches {
            trace!(key = %hex::encode(key), "proof does not match the claim");
            return false;
        }

        self.compute_root::<D>().as_ref() == Some(root)
    }

    /// Recomputes the root hash this proof commits to, or `None` if the proof is internally
    /// inconsistent.
    pub fn compute_root<D: Digest32>(&self) -> Option<Hash> {
        match self {
            Proof::Existence(leaf) => leaf.compute_root::<D>(),
            Proof::NonExistence { key, left, right } => match (left, right) {
                (None, None) => Some(Hash::empty::<D>()),
                (Some(left), None) => {
                    if left.key.as_slice() >= key.as_slice() || !all(&left.path, Direction::Right) {
                        return None;
                    }
                    left.compute_root::<D>()
                }
                (None, Some(right)) => {
                    if right.key.as_slice() <= key.as_slice() || !all(&right.path, Direction::Left) {
                        return None;
                    }
                    right.compute_root::<D>()
                }
                (Some(left), Some(right)) => {
                    if !(left.key.as_slice() < key.as_slice() && key.as_slice() < right.key.as_slice())
                        || !adjacent(&left.path, &right.path)
                    {
                        return None;
                    }

                    let root = left.compute_root::<D>()?;
                    (right.compute_root::<D>()? == root).then_some(root)
                }
            },
        }
    }
}

impl LeafProof {
    /// Folds the path from the leaf up to the root.
    ///
    /// Every step must agree with the search order: the path goes left exactly when the
    /// leaf key sorts before the split key.
    pub fn compute_root<D: Digest32>(&self) -> Option<Hash> {
        let mut hash = Hash::leaf::<D>(&self.key, &self.value);

        for step in self.path.iter().rev() {
            let goes_left = self.key < step.split_key;
            if goes_left != (step.direction == Direction::Left) {
                return None;
            }

            hash = match step.direction {
                Direction::Left => {
                    Hash::inner::<D>(&hash, &step.sibling, &step.split_key, step.height, step.size)
                }
                Direction::Right => {
                    Hash::inner::<D>(&step.sibling, &hash, &step.split_key, step.height, step.size)
                }
            };
        }

        Some(hash)
    }
}

fn all(path: &[Step], direction: Direction) -> bool {
    path.iter().all(|step| step.direction == direction)
}

/// Two leaves are in-order neighbours when their paths share a prefix, fork at one node with
/// the left leaf going left, and then hug the fork: rightmost below the left branch, leftmost
/// below the right one.
fn adjacent(left: &[Step], right: &[Step]) -> bool {
    let Some(fork) = left
        .iter()
        .zip(right)
        .position(|(l, r)| l.direction != r.direction)
    else {
        return false;
    };

    left[fork].direction == Direction::Left
        && all(&left[fork + 1..], Direction::Right)
        && all(&right[fork + 1..], Direction::Left)
}
