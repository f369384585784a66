//! Copy-on-write AVL operations over [`NodeRef`] roots.
//!
//! Keys live in the leaves. Every inner node keeps the smallest key of its right subtree as
//! its split key: a lookup for `key` goes left when `key < split_key` and right otherwise.
//!
//! None of these functions modify a node. A mutation rebuilds the nodes on the path from
//! the root to the change and points the rebuilt nodes at the untouched siblings, so every
//! other root that shares the old path keeps seeing exactly what it saw before.

use std::cmp::Ordering;

use crate::{
    node::{Kind, Node, NodeRef},
    prelude::*,
};

mod iter;

pub use iter::Iter;

/// Result of [`set`].
pub(crate) enum Set {
    /// The key already held this exact value; the root is untouched.
    Unchanged,
    /// The value of an existing key was replaced.
    Updated(NodeRef),
    /// A new key was added.
    Inserted(NodeRef),
}

/// A successful removal from a subtree.
struct Removed {
    node: Option<NodeRef>,
    /// The new smallest key of the subtree, when removal changed it.
    min_key: Option<Vec<u8>>,
    value: Vec<u8>,
}

/// Looks `key` up, returning its in-order rank alongside its value.
///
/// For a missing key the rank is the position it would be inserted at, i.e. the number of
/// keys that are strictly smaller.
pub(crate) fn get<'a>(root: Option<&'a NodeRef>, key: &[u8]) -> (u64, Option<&'a [u8]>) {
    let Some(mut node) = root else {
        return (0, None);
    };
    let mut index = 0;

    loop {
        match node.kind() {
            Kind::Leaf {
                key: leaf_key,
                value,
            } => {
                return match key.cmp(leaf_key) {
                    Ordering::Equal => (index, Some(value.as_slice())),
                    Ordering::Less => (index, None),
                    Ordering::Greater => (index + 1, None),
                }
            }
            Kind::Inner {
                left,
                right,
                split_key,
            } => {
                if key < split_key.as_slice() {
                    node = left;
                } else {
                    index += left.size();
                    node = right;
                }
            }
        }
    }
}

/// Returns the key/value pair at in-order position `index`.
pub(crate) fn get_by_index(root: Option<&NodeRef>, mut index: u64) -> Option<(&[u8], &[u8])> {
    let mut node = root?;

    if index >= node.size() {
        return None;
    }

    loop {
        match node.kind() {
            Kind::Leaf { key, value } => return Some((key.as_slice(), value.as_slice())),
            Kind::Inner { left, right, .. } => {
                if index < left.size() {
                    node = left;
                } else {
                    index -= left.size();
                    node = right;
                }
            }
        }
    }
}

/// Inserts or replaces `key`, stamping every rebuilt node with `version`.
pub(crate) fn set(root: Option<&NodeRef>, key: &[u8], value: &[u8], version: u64) -> Set {
    match root {
        None => Set::Inserted(Node::leaf(key.to_vec(), value.to_vec(), version)),
        Some(node) => set_node(node, key, value, version),
    }
}

fn set_node(node: &NodeRef, key: &[u8], value: &[u8], version: u64) -> Set {
    match node.kind() {
        Kind::Leaf {
            key: leaf_key,
            value: leaf_value,
        } => match key.cmp(leaf_key) {
            Ordering::Equal if leaf_value.as_slice() == value => Set::Unchanged,
            Ordering::Equal => Set::Updated(Node::leaf(key.to_vec(), value.to_vec(), version)),
            Ordering::Less => Set::Inserted(Node::inner(
                Node::leaf(key.to_vec(), value.to_vec(), version),
                node.clone(),
                leaf_key.clone(),
                version,
            )),
            Ordering::Greater => Set::Inserted(Node::inner(
                node.clone(),
                Node::leaf(key.to_vec(), value.to_vec(), version),
                key.to_vec(),
                version,
            )),
        },
        Kind::Inner {
            left,
            right,
            split_key,
        } => {
            if key < split_key.as_slice() {
                match set_node(left, key, value, version) {
                    Set::Unchanged => Set::Unchanged,
                    Set::Updated(left) => Set::Updated(Node::inner(
                        left,
                        right.clone(),
                        split_key.clone(),
                        version,
                    )),
                    Set::Inserted(left) => Set::Inserted(balance(
                        left,
                        right.clone(),
                        split_key.clone(),
                        version,
                    )),
                }
            } else {
                match set_node(right, key, value, version) {
                    Set::Unchanged => Set::Unchanged,
                    Set::Updated(right) => Set::Updated(Node::inner(
                        left.clone(),
                        right,
                        split_key.clone(),
                        version,
                    )),
                    Set::Inserted(right) => Set::Inserted(balance(
                        left.clone(),
                        right,
                        split_key.clone(),
                        version,
                    )),
                }
            }
        }
    }
}

/// Removes `key`, returning the new root (`None` once the tree is empty) and the removed
/// value. Returns `None` when the key is absent.
pub(crate) fn remove(
    root: Option<&NodeRef>,
    key: &[u8],
    version: u64,
) -> Option<(Option<NodeRef>, Vec<u8>)> {
    let removed = remove_node(root?, key, version)?;
    Some((removed.node, removed.value))
}

fn remove_node(node: &NodeRef, key: &[u8], version: u64) -> Option<Removed> {
    match node.kind() {
        Kind::Leaf {
            key: leaf_key,
            value,
        } => (leaf_key.as_slice() == key).then(|| Removed {
            node: None,
            min_key: None,
            value: value.clone(),
        }),
        Kind::Inner {
            left,
            right,
            split_key,
        } => {
            if key < split_key.as_slice() {
                let removed = remove_node(left, key, version)?;

                Some(match removed.node {
                    // The sibling takes the parent's place, and its smallest key becomes
                    // the smallest key of this subtree.
                    None => Removed {
                        node: Some(right.clone()),
                        min_key: Some(split_key.clone()),
                        value: removed.value,
                    },
                    Some(left) => Removed {
                        node: Some(balance(left, right.clone(), split_key.clone(), version)),
                        min_key: removed.min_key,
                        value: removed.value,
                    },
                })
            } else {
                let removed = remove_node(right, key, version)?;

                Some(match removed.node {
                    None => Removed {
                        node: Some(left.clone()),
                        min_key: None,
                        value: removed.value,
                    },
                    Some(right) => {
                        let split_key = removed.min_key.unwrap_or_else(|| split_key.clone());

                        Removed {
                            node: Some(balance(left.clone(), right, split_key, version)),
                            min_key: None,
                            value: removed.value,
                        }
                    }
                })
            }
        }
    }
}

/// Joins two subtrees under a new inner node, rotating when their heights differ by two.
fn balance(left: NodeRef, right: NodeRef, split_key: Vec<u8>, version: u64) -> NodeRef {
    let factor = left.height() as i16 - right.height() as i16;

    if factor > 1 {
        if left.balance_factor() < 0 {
            let Kind::Inner {
                left: left_left,
                right: left_right,
                split_key: left_split,
            } = left.kind()
            else {
                unreachable!("a left-heavy node has an inner left child");
            };
            let left = rotate_left(left_left, left_right, left_split, version);
            return rotate_right(&left, &right, &split_key, version);
        }
        return rotate_right(&left, &right, &split_key, version);
    }

    if factor < -1 {
        if right.balance_factor() > 0 {
            let Kind::Inner {
                left: right_left,
                right: right_right,
                split_key: right_split,
            } = right.kind()
            else {
                unreachable!("a right-heavy node has an inner right child");
            };
            let right = rotate_right(right_left, right_right, right_split, version);
            return rotate_left(&left, &right, &split_key, version);
        }
        return rotate_left(&left, &right, &split_key, version);
    }

    Node::inner(left, right, split_key, version)
}

/// Rotates the node `(left, right, split_key)` to the right; `left` must be inner.
fn rotate_right(left: &NodeRef, right: &NodeRef, split_key: &[u8], version: u64) -> NodeRef {
    let Kind::Inner {
        left: left_left,
        right: left_right,
        split_key: left_split,
    } = left.kind()
    else {
        unreachable!("right rotation requires an inner left child");
    };

    let right = Node::inner(left_right.clone(), right.clone(), split_key.to_vec(), version);
    Node::inner(left_left.clone(), right, left_split.clone(), version)
}

/// Rotates the node `(left, right, split_key)` to the left; `right` must be inner.
fn rotate_left(left: &NodeRef, right: &NodeRef, split_key: &[u8], version: u64) -> NodeRef {
    let Kind::Inner {
        left: right_left,
        right: right_right,
        split_key: right_split,
    } = right.kind()
    else {
        unreachable!("left rotation requires an inner right child");
    };

    let left = Node::inner(left.clone(), right_left.clone(), split_key.to_vec(), version);
    Node::inner(left, right_right.clone(), right_split.clone(), version)
}

/// Audits the subtree under `root`: balance, key order, split keys, sizes, heights, and any
/// hash already cached against a fresh computation with `D`.
pub(crate) fn check_invariants<D: Digest32>(root: Option<&NodeRef>) -> Result<()> {
    if let Some(root) = root {
        check_node::<D>(root)?;
    }
    Ok(())
}

/// Returns the smallest and largest key of the subtree.
fn check_node<'a, D: Digest32>(node: &'a NodeRef) -> Result<(&'a [u8], &'a [u8])> {
    let fail = |reason: String| Err(Error::InvariantViolation(reason));

    match node.kind() {
        Kind::Leaf { key, value } => {
            if node.height() != 0 || node.size() != 1 {
                return fail(format!("leaf {} has height/size", hex::encode(key)));
            }
            if node.is_hashed() && node.hash::<D>() != Hash::leaf::<D>(key, value) {
                return fail(format!("stale hash on leaf {}", hex::encode(key)));
            }
            Ok((key.as_slice(), key.as_slice()))
        }
        Kind::Inner {
            left,
            right,
            split_key,
        } => {
            let (min, left_max) = check_node::<D>(left)?;
            let (right_min, max) = check_node::<D>(right)?;

            if left_max >= right_min {
                return fail(format!(
                    "keys out of order around {}",
                    hex::encode(split_key)
                ));
            }
            if split_key.as_slice() != right_min {
                return fail(format!(
                    "split key {} is not the right subtree minimum {}",
                    hex::encode(split_key),
                    hex::encode(right_min)
                ));
            }
            if node.balance_factor().abs() > 1 {
                return fail(format!(
                    "node at {} is unbalanced ({})",
                    hex::encode(split_key),
                    node.balance_factor()
                ));
            }
            if node.height() != 1 + left.height().max(right.height()) {
                return fail(format!("wrong height at {}", hex::encode(split_key)));
            }
            if node.size() != left.size() + right.size() {
                return fail(format!("wrong size at {}", hex::encode(split_key)));
            }
            if node.is_hashed() {
                let expected = Hash::inner::<D>(
                    &left.hash::<D>(),
                    &right.hash::<D>(),
                    split_key,
                    node.height(),
                    node.size(),
                );
                if node.hash::<D>() != expected {
                    return fail(format!("stale hash at {}", hex::encode(split_key)));
                }
            }
            Ok((min, max))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    type Blake3 = blake3::Hasher;

    fn build<K: AsRef<[u8]>>(keys: &[K]) -> Option<NodeRef> {
        keys.iter().fold(None, |root, key| {
            let key = key.as_ref();
            match set(root.as_ref(), key, key, 1) {
                Set::Inserted(root) | Set::Updated(root) => Some(root),
                Set::Unchanged => root,
            }
        })
    }

    fn keys(root: Option<&NodeRef>) -> Vec<Vec<u8>> {
        Iter::new(root, None, None)
            .map(|(key, _)| key.to_vec())
            .collect()
    }

    #[test]
    fn test_ascending_inserts_rotate_left() {
        let root = build(&[b"a", b"b", b"c"]).unwrap();

        assert_eq!(root.height(), 2);
        check_invariants::<Blake3>(Some(&root)).unwrap();
    }

    #[test]
    fn test_descending_inserts_rotate_right() {
        let root = build(&[b"c", b"b", b"a"]).unwrap();

        assert_eq!(root.height(), 2);
        check_invariants::<Blake3>(Some(&root)).unwrap();
        assert_eq!(keys(Some(&root)), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_zig_zag_inserts_double_rotate() {
        for order in [[b"a", b"c", b"b"], [b"c", b"a", b"b"]] {
            let root = build(&order).unwrap();
            check_invariants::<Blake3>(Some(&root)).unwrap();
            assert_eq!(root.size(), 3);
        }
    }

    #[test]
    fn test_many_inserts_stay_logarithmic() {
        let owned: Vec<Vec<u8>> = (0u32..1024).map(|i| i.to_be_bytes().to_vec()).collect();
        let refs: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
        let root = build(&refs).unwrap();

        check_invariants::<Blake3>(Some(&root)).unwrap();
        assert_eq!(root.size(), 1024);
        // AVL height bound: 1.44 * log2(n + 2)
        assert!(root.height() <= 14, "height {}", root.height());
    }

    #[test]
    fn test_get_reports_rank() {
        let root = build(&[b"b", b"d", b"f"]);

        assert_eq!(get(root.as_ref(), b"b"), (0, Some(&b"b"[..])));
        assert_eq!(get(root.as_ref(), b"f"), (2, Some(&b"f"[..])));
        assert_eq!(get(root.as_ref(), b"a"), (0, None));
        assert_eq!(get(root.as_ref(), b"c"), (1, None));
        assert_eq!(get(root.as_ref(), b"e"), (2, None));
        assert_eq!(get(root.as_ref(), b"z"), (3, None));
        assert_eq!(get(None, b"a"), (0, None));
    }

    #[test]
    fn test_get_by_index_matches_rank() {
        let root = build(&[b"q", b"w", b"e", b"r", b"t", b"y"]);

        for index in 0..6 {
            let (key, _) = get_by_index(root.as_ref(), index).unwrap();
            assert_eq!(get(root.as_ref(), key).0, index);
        }
        assert!(get_by_index(root.as_ref(), 6).is_none());
    }

    #[test]
    fn test_update_keeps_shape_and_shares_siblings() {
        let root = build(&[b"a", b"b", b"c", b"d"]).unwrap();

        let Set::Updated(updated) = set(Some(&root), b"a", b"new", 2) else {
            panic!("expected an update");
        };

        assert_eq!(updated.height(), root.height());
        assert_eq!(get(Some(&updated), b"a").1, Some(&b"new"[..]));
        assert_eq!(get(Some(&root), b"a").1, Some(&b"a"[..]));
        // The right half was not on the path, so both roots point at the same node.
        assert!(Arc::ptr_eq(root.right().unwrap(), updated.right().unwrap()));
        assert_eq!(updated.version(), 2);
        assert_eq!(updated.right().unwrap().version(), 1);
    }

    #[test]
    fn test_set_same_value_is_unchanged() {
        let root = build(&[b"a", b"b"]).unwrap();
        assert!(matches!(set(Some(&root), b"a", b"a", 2), Set::Unchanged));
    }

    #[test]
    fn test_remove_fixes_split_keys() {
        let root = build(&[b"a", b"b", b"c", b"d", b"e"]);

        let (root, value) = remove(root.as_ref(), b"c", 2).unwrap();
        assert_eq!(value, b"c".to_vec());
        check_invariants::<Blake3>(root.as_ref()).unwrap();

        let (root, _) = remove(root.as_ref(), b"d", 2).unwrap();
        check_invariants::<Blake3>(root.as_ref()).unwrap();
        assert_eq!(keys(root.as_ref()), vec![b"a".to_vec(), b"b".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn test_remove_missing_key() {
        let root = build(&[b"a", b"b"]);

        assert!(remove(root.as_ref(), b"c", 2).is_none());
        assert!(remove(None, b"c", 2).is_none());
    }

    #[test]
    fn test_remove_last_key_empties_tree() {
        let root = build(&[b"only"]);
        let (root, value) = remove(root.as_ref(), b"only", 2).unwrap();

        assert!(root.is_none());
        assert_eq!(value, b"only".to_vec());
    }

    #[test]
    fn test_removals_rebalance() {
        let owned: Vec<Vec<u8>> = (0u8..64).map(|i| vec![i]).collect();
        let refs: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
        let mut root = build(&refs);

        for key in owned.iter().step_by(2).chain(owned.iter().skip(1).step_by(4)) {
            root = remove(root.as_ref(), key, 2).unwrap().0;
            check_invariants::<Blake3>(root.as_ref()).unwrap();
        }

        assert_eq!(root.unwrap().size(), 16);
    }

    #[test]
    fn test_check_invariants_reports_unbalanced_nodes() {
        let a = Node::leaf(b"a".to_vec(), b"1".to_vec(), 1);
        let b = Node::leaf(b"b".to_vec(), b"2".to_vec(), 1);
        let c = Node::leaf(b"c".to_vec(), b"3".to_vec(), 1);
        let d = Node::leaf(b"d".to_vec(), b"4".to_vec(), 1);

        let cd = Node::inner(c, d, b"d".to_vec(), 1);
        let bcd = Node::inner(b, cd, b"c".to_vec(), 1);
        let skewed = Node::inner(a, bcd, b"b".to_vec(), 1);

        assert!(matches!(
            check_invariants::<Blake3>(Some(&skewed)),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_check_invariants_reports_bad_split_key() {
        let a = Node::leaf(b"a".to_vec(), b"1".to_vec(), 1);
        let b = Node::leaf(b"b".to_vec(), b"2".to_vec(), 1);
        let root = Node::inner(a, b, b"a".to_vec(), 1);

        assert!(check_invariants::<Blake3>(Some(&root)).is_err());
    }
}
