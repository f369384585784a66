//! A versioned key-value store backed by a copy-on-write Merkle AVL tree.
//!
//! [`MutableTree`] absorbs writes and checkpoints them as numbered versions. Every saved
//! version stays readable, either directly through the working tree or as a detached
//! [`ImmutableTree`] snapshot, and every lookup can come with a [`Proof`] that checks
//! against the version's root hash alone.
//!
//! ```
//! use merkle_avl::prelude::*;
//!
//! let mut tree: MutableTree = MutableTree::new();
//! tree.set(b"a", b"1");
//! let (root, version) = tree.save_version()?;
//!
//! let (value, proof) = tree.get_versioned_with_proof(b"a", version)?;
//! assert_eq!(value, Some(&b"1"[..]));
//! assert!(proof.verify::<DefaultDigest>(&root, b"a", value));
//! # Ok::<(), merkle_avl::Error>(())
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod error;
mod hash;
mod immutable;
mod mutable;
mod options;
mod store;
mod version;
mod view;

pub mod node;
pub mod prelude;
pub mod proof;
pub mod testing;
mod tree;

pub use prelude::*;
pub use tree::Iter;

#[doc(hidden)]
/// This is a hidden module to make the macros defined on this crate available for the users.
pub mod __dependencies {
    pub use paste;
    pub use proptest;
    pub use test_strategy;
}

/// Generates the model-based property suite of [`MutableTree`] for one digest.
///
/// The digest has to be a plain type name in scope, e.g. `use sha2::Sha256;` first.
#[macro_export]
macro_rules! test_tree_properties {
    ($digest:ident) => {
        $crate::__dependencies::paste::paste! {
            mod [<test_tree_properties_$digest:snake>] {
                use std::collections::BTreeMap;

                use $crate::__dependencies::{
                    proptest::prelude::*,
                    test_strategy,
                };
                use $crate::prelude::*;
                use $crate::testing::{apply, build, entries, key, keys, operations, value, Operation};

                use super::$digest;

                type Tree = MutableTree<$digest, MemoryStore>;

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_matches_model(#[strategy(operations(0..64))] ops: Vec<Operation>) {
                    let (tree, model): (Tree, _) = build(&ops);

                    prop_assert!(tree.check_invariants().is_ok());
                    prop_assert_eq!(tree.size(), model.len() as u64);
                    prop_assert_eq!(tree.is_empty(), model.is_empty());
                    prop_assert!(
                        tree.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).eq(model.clone())
                    );

                    for (rank, (key, value)) in model.iter().enumerate() {
                        prop_assert_eq!(tree.get(key), (rank as u64, Some(value.as_slice())));
                        prop_assert_eq!(
                            tree.get_by_index(rank as u64),
                            Some((key.as_slice(), value.as_slice()))
                        );
                    }
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_set_reports_existing_keys(
                    #[strategy(entries(0..32))] entries: Vec<(Vec<u8>, Vec<u8>)>,
                ) {
                    let mut tree = Tree::new();
                    let mut model = BTreeMap::new();

                    for (key, value) in entries {
                        prop_assert_eq!(tree.set(&key, &value), model.contains_key(&key));
                        prop_assert_eq!(tree.get(&key).1, Some(value.as_slice()));
                        model.insert(key, value);
                    }

                    prop_assert_eq!(tree.size(), model.len() as u64);
                    prop_assert!(tree.check_invariants().is_ok());
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_removing_absent_keys_keeps_hash(
                    #[strategy(operations(0..64))] ops: Vec<Operation>,
                    #[strategy(keys(0..16))] candidates: Vec<Vec<u8>>,
                ) {
                    let (mut tree, model): (Tree, _) = build(&ops);

                    for absent in candidates.iter().filter(|key| !model.contains_key(*key)) {
                        $crate::prop_assert_does_not_change!(tree.remove(absent), tree.hash());
                    }
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_absent_key_rank(
                    #[strategy(operations(0..64))] ops: Vec<Operation>,
                    #[strategy(key())] lookup: Vec<u8>,
                ) {
                    let (tree, model): (Tree, _) = build(&ops);
                    let smaller = model.range::<Vec<u8>, _>(..lookup.clone()).count() as u64;

                    prop_assert_eq!(tree.get(&lookup), (smaller, model.get(&lookup).map(Vec::as_slice)));
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_replay_is_deterministic(#[strategy(operations(0..64))] ops: Vec<Operation>) {
                    let (a, _): (Tree, _) = build(&ops);
                    let (b, _): (Tree, _) = build(&ops);

                    prop_assert_eq!(a.hash(), b.hash());
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_setting_current_value_keeps_hash(
                    #[strategy(operations(0..64))] ops: Vec<Operation>,
                    #[strategy(key())] target: Vec<u8>,
                    #[strategy(value())] contents: Vec<u8>,
                ) {
                    let (mut tree, _): (Tree, _) = build(&ops);
                    tree.set(&target, &contents);

                    $crate::prop_assert_does_not_change!(tree.set(&target, &contents), tree.hash());
                    prop_assert!(tree.set(&target, &contents));
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_proofs_verify(
                    #[strategy(operations(0..64))] ops: Vec<Operation>,
                    #[strategy(key())] lookup: Vec<u8>,
                ) {
                    let (tree, model): (Tree, _) = build(&ops);
                    let root = tree.hash();

                    let (value, proof) = tree.get_with_proof(&lookup);
                    prop_assert_eq!(value, model.get(&lookup).map(Vec::as_slice));
                    prop_assert!(proof.verify::<$digest>(&root, &lookup, value));

                    let flipped = match value {
                        Some(_) => None,
                        None => Some(&b"forged"[..]),
                    };
                    prop_assert!(!proof.verify::<$digest>(&root, &lookup, flipped));

                    let decoded = Proof::from_bytes(&proof.to_bytes())?;
                    prop_assert!(decoded.verify::<$digest>(&root, &lookup, value));
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_snapshots_are_isolated(
                    #[strategy(operations(0..64))] before: Vec<Operation>,
                    #[strategy(operations(1..64))] after: Vec<Operation>,
                ) {
                    let (mut tree, mut model): (Tree, _) = build(&before);
                    let (hash, version) = tree.save_version()?;
                    let saved = model.clone();
                    let snapshot = tree.get_immutable(version)?;

                    apply(&mut tree, &mut model, &after);
                    tree.save_version()?;

                    prop_assert_eq!(snapshot.hash(), hash);
                    prop_assert!(
                        snapshot.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).eq(saved.clone())
                    );

                    for (key, value) in &saved {
                        prop_assert_eq!(tree.get_versioned(key, version)?.1, Some(value.as_slice()));
                    }
                    prop_assert!(tree.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).eq(model));
                }

                #[cfg_attr(coverage_nightly, coverage(off))]
                #[test_strategy::proptest(fork = false)]
                fn test_removing_everything_empties_the_tree(
                    #[strategy(operations(0..64))] ops: Vec<Operation>,
                ) {
                    let (mut tree, model): (Tree, BTreeMap<Vec<u8>, Vec<u8>>) = build(&ops);

                    for (key, value) in &model {
                        let removed = tree.remove(key);
                        prop_assert_eq!(removed.as_ref(), Some(value));
                        prop_assert!(tree.check_invariants().is_ok());
                    }

                    prop_assert!(tree.is_empty());
                    prop_assert_eq!(tree.hash(), Hash::empty::<$digest>());
                }
            }
        }
    };
}

#[macro_export]
macro_rules! prop_assert_does_not_change {
    ($action: expr, $value: expr) => {
        let old_value = $value.clone();

        $action;

        prop_assert_eq!($value, old_value);
    };
}
